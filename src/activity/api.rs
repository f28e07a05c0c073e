//! Game metadata lookups against the public Roblox web API.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

const UNIVERSES_URL: &str = "https://apis.roblox.com";
const GAMES_URL: &str = "https://games.roblox.com";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameDetail {
    pub name: String,
    pub creator: Creator,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Creator {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniverseResponse {
    universe_id: u64,
}

#[derive(Deserialize)]
struct GamesResponse {
    data: Vec<GameDetail>,
}

#[derive(Debug, Clone)]
pub struct GameApi {
    client: reqwest::Client,
    universes_base: String,
    games_base: String,
}

impl Default for GameApi {
    fn default() -> Self {
        Self::with_bases(UNIVERSES_URL, GAMES_URL)
    }
}

impl GameApi {
    pub fn with_bases(universes_base: &str, games_base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(concat!("vinegar/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            universes_base: universes_base.trim_end_matches('/').to_string(),
            games_base: games_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn universe_id(&self, place_id: u64) -> Result<u64> {
        let url = format!(
            "{}/universes/v1/places/{place_id}/universe",
            self.universes_base
        );
        let resp: UniverseResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decode universe")?;
        Ok(resp.universe_id)
    }

    pub async fn game(&self, universe_id: u64) -> Result<GameDetail> {
        let url = format!("{}/v1/games", self.games_base);
        let resp: GamesResponse = self
            .client
            .get(&url)
            .query(&[("universeIds", universe_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decode games")?;
        match resp.data.into_iter().next() {
            Some(game) => Ok(game),
            None => bail!("universe {universe_id} has no game"),
        }
    }

    /// Place to game in two hops.
    pub async fn place_game(&self, place_id: u64) -> Result<GameDetail> {
        let universe = self
            .universe_id(place_id)
            .await
            .with_context(|| format!("universe of place {place_id}"))?;
        self.game(universe)
            .await
            .with_context(|| format!("game of universe {universe}"))
    }
}
