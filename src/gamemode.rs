//! GameMode registration through the XDG desktop portal.

use tracing::{debug, info, warn};

const PORTAL_DEST: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const PORTAL_IFACE: &str = "org.freedesktop.portal.GameMode";

/// Something that can ask the session to treat a process as a game.
///
/// Registration is fire-and-forget: it never fails from the caller's view.
pub trait GameModeRegistrar: Send + Sync {
    fn register(&self, pid: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PortalGameMode;

impl GameModeRegistrar for PortalGameMode {
    fn register(&self, pid: u32) {
        tokio::spawn(async move {
            match register_game(pid).await {
                Ok(0) => info!(pid, "Registered with GameMode"),
                Ok(code) => warn!(pid, code, "GameMode refused registration"),
                Err(err) if is_unsupported(&err) => {
                    debug!(error = %err, "GameMode portal unavailable")
                }
                Err(err) => warn!(error = %err, "Attempted to register to GameMode"),
            }
        });
    }
}

async fn register_game(pid: u32) -> zbus::Result<i32> {
    let conn = zbus::Connection::session().await?;
    let pid = i32::try_from(pid)
        .map_err(|_| zbus::Error::Failure(format!("pid {pid} out of range")))?;
    let reply = conn
        .call_method(
            Some(PORTAL_DEST),
            PORTAL_PATH,
            Some(PORTAL_IFACE),
            "RegisterGame",
            &(pid,),
        )
        .await?;
    let code: i32 = reply.body().deserialize()?;
    Ok(code)
}

/// Whether `err` only says the session has no GameMode portal.
pub(crate) fn is_unsupported(err: &zbus::Error) -> bool {
    use zbus::fdo::Error as Fdo;

    match err {
        zbus::Error::InterfaceNotFound => true,
        zbus::Error::MethodError(name, _, _) => matches!(
            name.as_str(),
            "org.freedesktop.DBus.Error.UnknownMethod"
                | "org.freedesktop.DBus.Error.UnknownObject"
                | "org.freedesktop.DBus.Error.UnknownInterface"
                | "org.freedesktop.DBus.Error.ServiceUnknown"
        ),
        zbus::Error::FDO(e) => matches!(
            **e,
            Fdo::UnknownMethod(_)
                | Fdo::UnknownObject(_)
                | Fdo::UnknownInterface(_)
                | Fdo::ServiceUnknown(_)
        ),
        _ => false,
    }
}
