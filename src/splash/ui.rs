use super::{Phase, Splash, SplashError, SplashState};
use crate::logs;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Terminal,
};
use std::{io, time::Duration, time::Instant};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Run the splash loop on the calling thread until the window closes.
pub(super) fn run_threaded(splash: &Splash) -> Result<(), SplashError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();
    logs::mute_stderr(true);

    let res = match Terminal::new(CrosstermBackend::new(stdout)) {
        Ok(mut terminal) => {
            terminal.clear().ok();
            event_loop(splash, &mut terminal)
        }
        Err(e) => Err(SplashError::Terminal(e)),
    };

    logs::mute_stderr(false);
    disable_raw_mode().ok();
    execute!(io::stdout(), LeaveAlternateScreen).ok();
    res
}

fn event_loop(
    splash: &Splash,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<(), SplashError> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut frame = 0usize;

    loop {
        if splash.with_state(|s| s.phase == Phase::Closed && s.closed_by_program) {
            return Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            frame = frame.wrapping_add(1);
            splash.with_state(|s| terminal.draw(|f| draw(f.area(), f, s, frame)).map(|_| ()))?;
            last_tick = Instant::now();
        }

        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(k) = event::read()? else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }

        let (has_dialog, ask) = splash.with_state(|s| {
            s.dialog
                .as_ref()
                .map(|d| (true, d.ask))
                .unwrap_or((false, false))
        });

        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                splash.user_close();
                return Err(SplashError::Closed);
            }
            (_, KeyCode::Enter) | (_, KeyCode::Char('y')) if has_dialog => splash.answer(true),
            (_, KeyCode::Char('n')) if has_dialog && ask => splash.answer(false),
            _ => {}
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, s: &SplashState, frame: usize) {
    let outer = centered(area, 64, 9);
    f.render_widget(Clear, outer);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Vinegar · {} ", s.title));

    let lines = match s.phase {
        Phase::Invalidated => error_lines(s),
        _ => progress_lines(s, frame),
    };
    let body = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(body, outer);

    if let Some(d) = &s.dialog {
        let popup = centered(area, 60, 7);
        let hint = if d.ask {
            "[y] Yes   [n] No"
        } else {
            "[Enter] OK"
        };
        let p = Paragraph::new(vec![
            Line::from(d.text.clone()),
            Line::from(""),
            Line::from(Span::styled(hint, Style::default().fg(Color::Magenta))),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Notice "))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        f.render_widget(Clear, popup);
        f.render_widget(p, popup);
    }
}

fn progress_lines(s: &SplashState, frame: usize) -> Vec<Line<'static>> {
    vec![
        Line::from(""),
        Line::from(vec![
            Span::styled(
                SPINNER[frame % SPINNER.len()].to_string(),
                Style::default().fg(Color::Magenta),
            ),
            Span::raw(" "),
            Span::styled(
                s.message.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(Span::styled(s.desc.clone(), Style::default().fg(Color::Gray))),
        Line::from(""),
        Line::from(Span::styled(
            "q / Esc to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

fn error_lines(s: &SplashState) -> Vec<Line<'static>> {
    let mut out = vec![
        Line::from(Span::styled(
            "Vinegar experienced an error:",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(s.message.clone()),
    ];
    if let Some(p) = &s.log_path {
        out.push(Line::from(Span::styled(
            format!("Log: {}", p.display()),
            Style::default().fg(Color::Gray),
        )));
    }
    out.push(Line::from(""));
    out.push(Line::from(Span::styled(
        "q / Esc to close",
        Style::default().fg(Color::DarkGray),
    )));
    out
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height.min(area.height)),
            Constraint::Fill(1),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(width.min(area.width)),
            Constraint::Fill(1),
        ])
        .split(vertical[1])[1]
}
