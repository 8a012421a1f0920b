//! Frame layout and rendering.
//!
//! ```text
//!  ● Radio Elgean   https://…/live.m3u8
//! ┌ Now playing ───────────────────────┐
//! │ Artist                             │
//! │ Title                              │
//! │ Album · 2019        24-bit / 48 kHz│
//! └────────────────────────────────────┘
//!  ♥ 4 likes
//! ┌ Recently played ───────────────────┐
//! │ …                                  │
//! └────────────────────────────────────┘
//! ┌ Log ───────────────────────────────┐
//!  l like · r refresh · q quit      id
//! ```

use std::collections::VecDeque;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use elgean_listener::{LikeView, Phase, SessionSnapshot};
use elgean_proto::metadata::NowPlaying;

use crate::theme::{
    style_border, style_default, style_muted, style_secondary, style_title, C_ACCENT, C_ERROR,
    C_PENDING, C_PLAYING, C_TAG,
};

/// Lines of the warning log kept on screen.
pub const LOG_STRIP_LINES: usize = 3;

pub struct Screen<'a> {
    pub station_name: &'a str,
    pub stream_url: &'a str,
    pub snapshot: &'a SessionSnapshot,
    pub logs: &'a VecDeque<String>,
}

pub fn draw(frame: &mut Frame, screen: &Screen<'_>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(5),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(LOG_STRIP_LINES as u16 + 1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, rows[0], screen);
    draw_now_playing(frame, rows[1], screen.snapshot);
    frame.render_widget(
        Paragraph::new(like_line(&screen.snapshot.like)),
        rows[2],
    );
    draw_recent(frame, rows[3], screen.snapshot.now_playing.as_ref());
    draw_logs(frame, rows[4], screen.logs);
    draw_footer(frame, rows[5], screen.snapshot);
}

fn draw_header(frame: &mut Frame, area: Rect, screen: &Screen<'_>) {
    let name_width = screen.station_name.width() + 4;
    let url_room = (area.width as usize).saturating_sub(name_width);
    let line = Line::from(vec![
        Span::styled(" ● ", Style::default().fg(C_PLAYING)),
        Span::styled(screen.station_name.to_string(), style_title()),
        Span::raw(" "),
        Span::styled(truncate_width(screen.stream_url, url_room), style_muted()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_now_playing(frame: &mut Frame, area: Rect, snapshot: &SessionSnapshot) {
    let mut title = vec![Span::styled(" Now playing ", style_secondary())];
    if snapshot.metadata_stale {
        title.push(Span::styled("(stale) ", Style::default().fg(C_ERROR)));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border())
        .title(Line::from(title));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let width = inner.width as usize;
    let lines = match &snapshot.now_playing {
        None => vec![Line::from(Span::styled("waiting for metadata…", style_muted()))],
        Some(np) => {
            let text = |v: &Option<String>| v.as_deref().unwrap_or("Unknown").to_string();
            let detail: Vec<&str> = [np.album.as_deref(), np.date.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            let quality = np.quality_label().unwrap_or_default();
            let detail = truncate_width(
                &detail.join(" · "),
                width.saturating_sub(quality.width() + 1),
            );
            let pad = width.saturating_sub(detail.width() + quality.width());

            vec![
                Line::from(Span::styled(
                    truncate_width(&text(&np.artist), width),
                    style_title(),
                )),
                Line::from(Span::styled(
                    truncate_width(&text(&np.title), width),
                    style_default(),
                )),
                Line::from(vec![
                    Span::styled(detail, style_secondary()),
                    Span::raw(" ".repeat(pad)),
                    Span::styled(quality, Style::default().fg(C_TAG)),
                ]),
            ]
        }
    };
    frame.render_widget(Paragraph::new(lines), inner);
}

/// `♥ 4 likes`, with a marker while a call is in flight or when the shown
/// state was never confirmed by the server.
pub fn like_line(view: &LikeView) -> Line<'static> {
    if view.track.is_none() {
        return Line::from(Span::styled(" ♡ no track", style_muted()));
    }

    let heart = if view.liked {
        Span::styled(" ♥ ", Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD))
    } else {
        Span::styled(" ♡ ", style_secondary())
    };
    let noun = if view.count == 1 { "like" } else { "likes" };
    let count_style = if view.control_enabled {
        style_default()
    } else {
        style_muted()
    };

    let mut spans = vec![heart, Span::styled(format!("{} {}", view.count, noun), count_style)];
    match view.phase {
        Phase::Checking => spans.push(Span::styled("  checking…", Style::default().fg(C_PENDING))),
        Phase::Toggling => spans.push(Span::styled("  saving…", Style::default().fg(C_PENDING))),
        Phase::Idle if !view.confirmed => {
            spans.push(Span::styled("  (unconfirmed)", Style::default().fg(C_PENDING)))
        }
        Phase::Idle => {}
    }
    Line::from(spans)
}

fn draw_recent(frame: &mut Frame, area: Rect, now_playing: Option<&NowPlaying>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border())
        .title(Span::styled(" Recently played ", style_secondary()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let previous = now_playing.map(|np| np.previous.as_slice()).unwrap_or_default();
    let lines: Vec<Line> = if previous.is_empty() {
        vec![Line::from(Span::styled("nothing yet", style_muted()))]
    } else {
        previous
            .iter()
            .enumerate()
            .map(|(i, track)| {
                Line::from(vec![
                    Span::styled(format!("{}. ", i + 1), style_muted()),
                    Span::styled(
                        truncate_width(&track.display(), (inner.width as usize).saturating_sub(3)),
                        style_default(),
                    ),
                ])
            })
            .collect()
    };
    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_logs(frame: &mut Frame, area: Rect, logs: &VecDeque<String>) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(style_border())
        .title(Span::styled(" Log ", style_secondary()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let skip = logs.len().saturating_sub(inner.height as usize);
    let lines: Vec<Line> = logs
        .iter()
        .skip(skip)
        .map(|l| {
            let style = if l.contains("[ERROR]") {
                Style::default().fg(C_ERROR)
            } else {
                style_secondary()
            };
            Line::from(Span::styled(truncate_width(l, inner.width as usize), style))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_footer(frame: &mut Frame, area: Rect, snapshot: &SessionSnapshot) {
    let keys = " l like · r refresh · q quit";
    let id = snapshot.listener_id.as_deref().unwrap_or("");
    let pad = (area.width as usize).saturating_sub(keys.width() + id.width() + 1);
    let line = Line::from(vec![
        Span::styled(keys, style_secondary()),
        Span::raw(" ".repeat(pad)),
        Span::styled(id.to_string(), style_muted()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Cut `s` to at most `max` terminal columns, ending in `…` when cut.
pub fn truncate_width(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > max - 1 {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}
