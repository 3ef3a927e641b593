use crate::app::{App, Thumb, CELL_PX};
use crate::collection::ImageId;
use crate::thumbnail::SizeClass;
use crate::ui::theme::{theme, Theme};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, LineGauge, List, ListItem, Paragraph},
    Frame,
};
use ratatui_image::StatefulImage;

pub fn draw(f: &mut Frame, app: &mut App) {
    let theme = theme(&app.config.ui.theme);
    let area = f.area();

    // ratatui-image renders directly to terminal, bypassing widget z-order
    let popup_active = app.show_help;

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_focused))
        .style(Style::default().bg(theme.bg_dark));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let has_error = app.last_error.is_some();
    let mut constraints = vec![Constraint::Length(2)]; // Header
    if has_error {
        constraints.push(Constraint::Length(1)); // Error
    }
    constraints.push(Constraint::Min(8)); // Body
    constraints.push(Constraint::Length(2)); // Footer

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    let mut chunk_idx = 0;
    draw_header(f, app, chunks[chunk_idx], &theme);
    chunk_idx += 1;

    if has_error {
        draw_error(f, app, chunks[chunk_idx], &theme);
        chunk_idx += 1;
    }

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(26), // Page list
            Constraint::Min(30),        // Preview and carousel
            Constraint::Percentage(26), // Rated panel
        ])
        .split(chunks[chunk_idx]);
    chunk_idx += 1;

    draw_page_list(f, app, body[0], &theme);
    draw_preview(f, app, body[1], &theme, popup_active);
    draw_rated_panel(f, app, body[2], &theme, popup_active);

    draw_footer(f, app, chunks[chunk_idx], &theme);

    if app.show_help {
        draw_help_popup(f, app, area, &theme);
    }
}

fn stars(n: u8) -> String {
    let n = n.min(5) as usize;
    format!("{}{}", "★".repeat(n), "☆".repeat(5 - n))
}

/// Truncate to `max_chars`, marking the cut with an ellipsis.
fn truncate(name: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        String::new()
    } else if name.chars().count() <= max_chars {
        name.to_string()
    } else {
        let truncated: String = name.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}

/// Cells covered by a square thumbnail of `size` pixels.
fn cells_for(size: SizeClass) -> (u16, u16) {
    let w = (size.px() / CELL_PX.0).max(4);
    let h = (size.px() / CELL_PX.1).max(2);
    (w.min(u16::MAX as u32) as u16, h.min(u16::MAX as u32) as u16)
}

fn draw_header(f: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let session = &app.session;
    let sep = || Span::styled(" │ ", Style::default().fg(theme.fg_muted));

    let position = match session.current_index() {
        Some(i) => format!("{}/{}", i + 1, session.len()),
        None => format!("-/{}", session.len()),
    };
    let page = if session.is_empty() {
        "page -".to_string()
    } else {
        format!("page {}/{}", session.page() + 1, session.page_count())
    };

    let spans = vec![
        Span::styled(
            " ★ starsort ",
            Style::default()
                .fg(theme.accent_highlight)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("│ ", Style::default().fg(theme.fg_muted)),
        Span::styled(position, Style::default().fg(theme.accent_primary)),
        sep(),
        Span::styled(
            format!("{} rated", session.store().rated_count()),
            Style::default().fg(theme.fg_secondary),
        ),
        sep(),
        Span::styled(page, Style::default().fg(theme.fg_secondary)),
        sep(),
        Span::styled(
            format!("[{}]", session.filter()),
            Style::default().fg(theme.accent_secondary),
        ),
        Span::styled(" ", Style::default()),
        Span::styled(
            format!("[{}px]", app.slider_size()),
            Style::default().fg(theme.fg_secondary),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(spans)).alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn draw_error(f: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    if let Some(error) = &app.last_error {
        let error_line = Line::from(vec![
            Span::styled("⚠ ", Style::default().fg(theme.warning)),
            Span::styled(error, Style::default().fg(theme.warning)),
        ]);
        let paragraph = Paragraph::new(error_line).alignment(Alignment::Center);
        f.render_widget(paragraph, area);
    }
}

fn draw_page_list(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme) {
    let block = Block::default()
        .title(" Collection ")
        .title_style(Style::default().fg(theme.accent_primary))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border));
    let inner = block.inner(area);
    f.render_widget(block, area);
    app.list_area = inner;

    let entries = app.session.page_entries();
    if entries.is_empty() {
        let empty = Paragraph::new(":open <dir> to start")
            .style(Style::default().fg(theme.fg_muted))
            .alignment(Alignment::Center);
        f.render_widget(empty, center_vertically(inner, 1));
        return;
    }

    let name_width = (inner.width as usize).saturating_sub(14);
    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| {
            let star_style = if entry.stars > 0 {
                Style::default().fg(theme.star)
            } else {
                Style::default().fg(theme.fg_muted)
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:>4} ", entry.index + 1),
                    Style::default().fg(theme.fg_muted),
                ),
                Span::styled(stars(entry.stars), star_style),
                Span::raw(" "),
                Span::styled(
                    truncate(&entry.id.file_name(), name_width),
                    Style::default().fg(theme.fg_secondary),
                ),
            ]))
        })
        .collect();

    let selected = entries.iter().position(|e| e.selected);
    app.list_state.select(selected);

    let list = List::new(items).highlight_style(
        Style::default()
            .bg(theme.bg_medium)
            .fg(theme.accent_highlight)
            .add_modifier(Modifier::BOLD),
    );
    f.render_stateful_widget(list, inner, &mut app.list_state);
}

fn draw_preview(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme, popup_active: bool) {
    let (_, strip_h) = cells_for(app.session.thumbnail_size());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(6),               // Preview
            Constraint::Length(2),            // Stars and name
            Constraint::Length(strip_h + 3),  // Carousel
        ])
        .split(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_focused))
        .style(Style::default().bg(theme.bg_medium));
    let inner = block.inner(chunks[0]);
    f.render_widget(block, chunks[0]);
    app.set_preview_area(inner);

    let Some(current) = app.session.current().cloned() else {
        let empty = Paragraph::new("No image selected")
            .style(Style::default().fg(theme.fg_muted))
            .alignment(Alignment::Center);
        f.render_widget(empty, center_vertically(inner, 1));
        return;
    };

    if popup_active {
        draw_placeholder(f, inner, theme);
    } else {
        let size = app.session.viewport_size_class();
        draw_thumb(f, app, &current, size, inner, theme);
    }

    let rating = app.session.current_rating();
    let info = vec![
        Line::from(Span::styled(
            stars(rating),
            Style::default().fg(if rating > 0 { theme.star } else { theme.fg_muted }),
        )),
        Line::from(Span::styled(
            truncate(&current.file_name(), chunks[1].width as usize),
            Style::default().fg(theme.fg_primary),
        )),
    ];
    f.render_widget(Paragraph::new(info).alignment(Alignment::Center), chunks[1]);

    if popup_active {
        draw_placeholder(f, chunks[2], theme);
    } else {
        draw_carousel(f, app, chunks[2], theme);
    }
}

/// Thumbnails around the selection, centred on it.
fn draw_carousel(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme) {
    let total = app.session.len();
    let Some(selected) = app.session.current_index() else {
        return;
    };

    let size = app.session.thumbnail_size();
    let (thumb_w, thumb_h) = cells_for(size);
    let cell_w = thumb_w + 2 + 1; // border + spacing
    let fit = (area.width / cell_w).max(1) as usize;
    let visible = fit.min(total);
    let half = visible / 2;

    let start = if selected <= half {
        0
    } else if selected >= total.saturating_sub(half + 1) {
        total.saturating_sub(visible)
    } else {
        selected - half
    };
    let end = (start + visible).min(total);

    let row_width = (visible as u16) * cell_w;
    let start_x = area.x + area.width.saturating_sub(row_width) / 2;

    for (i, idx) in (start..end).enumerate() {
        let Some(id) = app.session.store().at(idx).cloned() else {
            continue;
        };
        let is_selected = idx == selected;

        let thumb_x = start_x + (i as u16) * cell_w;
        // Bounds check - skip if outside visible area
        if thumb_x + thumb_w + 2 > area.x + area.width || thumb_h + 2 > area.height {
            continue;
        }

        let thumb_area = Rect::new(thumb_x, area.y, thumb_w + 2, thumb_h + 2);
        let border_color = if is_selected { theme.accent_highlight } else { theme.border };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .style(Style::default().bg(theme.bg_medium));
        let inner = block.inner(thumb_area);
        f.render_widget(block, thumb_area);

        draw_thumb(f, app, &id, size, inner, theme);

        if thumb_area.bottom() < area.y + area.height {
            let indicator_area = Rect::new(thumb_x, thumb_area.bottom(), thumb_w + 2, 1);
            let stars_here = app.session.store().rating_of(&id);
            let (text, color) = if is_selected {
                ("▲".to_string(), theme.accent_highlight)
            } else if stars_here > 0 {
                (format!("{}★", stars_here), theme.star)
            } else {
                (String::new(), theme.fg_muted)
            };
            let indicator = Paragraph::new(text)
                .style(Style::default().fg(color))
                .alignment(Alignment::Center);
            f.render_widget(indicator, indicator_area);
        }
    }
}

fn draw_rated_panel(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme, popup_active: bool) {
    let filter = app.session.filter();
    let count = app.session.visible_count();

    let block = Block::default()
        .title(format!(" Rated · {} · {} ", filter, count))
        .title_style(Style::default().fg(theme.accent_primary))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if count == 0 {
        let empty = Paragraph::new("Nothing rated yet")
            .style(Style::default().fg(theme.fg_muted))
            .alignment(Alignment::Center);
        f.render_widget(empty, center_vertically(inner, 1));
        return;
    }

    let size = app.session.rated_size();
    let (thumb_w, thumb_h) = cells_for(size);
    let per_row = (inner.width / (thumb_w + 1)).max(1) as usize;
    let strip_h = if inner.height > thumb_h + 4 { thumb_h + 1 } else { 0 };

    let list_rows = inner.height.saturating_sub(strip_h) as usize;
    let shown = list_rows.max(per_row);
    let entries: Vec<_> = app.session.visible().iter().take(shown).cloned().collect();

    if strip_h > 0 {
        let strip = Rect::new(inner.x, inner.y, inner.width, thumb_h);
        if popup_active {
            draw_placeholder(f, strip, theme);
        } else {
            for (i, (id, _)) in entries.iter().take(per_row).enumerate() {
                let x = strip.x + (i as u16) * (thumb_w + 1);
                if x + thumb_w > strip.x + strip.width {
                    break;
                }
                draw_thumb(f, app, id, size, Rect::new(x, strip.y, thumb_w, thumb_h), theme);
            }
        }
    }

    let list_area = Rect::new(
        inner.x,
        inner.y + strip_h,
        inner.width,
        inner.height.saturating_sub(strip_h),
    );
    let name_width = (list_area.width as usize).saturating_sub(6);
    let items: Vec<ListItem> = entries
        .iter()
        .take(list_rows)
        .map(|(id, rating)| {
            ListItem::new(Line::from(vec![
                Span::styled(stars(rating.stars()), Style::default().fg(theme.star)),
                Span::raw(" "),
                Span::styled(
                    truncate(&id.file_name(), name_width),
                    Style::default().fg(theme.fg_secondary),
                ),
            ]))
        })
        .collect();
    f.render_widget(List::new(items), list_area);
}

/// One image slot: the protocol if decoded, otherwise a text stand-in.
fn draw_thumb(
    f: &mut Frame,
    app: &mut App,
    id: &ImageId,
    size: SizeClass,
    area: Rect,
    theme: &Theme,
) {
    let (text, color) = match app.thumb(id, size) {
        Thumb::Image(protocol) => {
            f.render_stateful_widget(StatefulImage::new(None), area, protocol);
            return;
        }
        Thumb::Loading => ("...".to_string(), theme.accent_primary),
        Thumb::Failed => (
            truncate(&format!("✗ {}", id.file_name()), area.width as usize),
            theme.warning,
        ),
        Thumb::Text => (truncate(&id.file_name(), area.width as usize), theme.fg_secondary),
    };

    let label = Paragraph::new(text)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);
    f.render_widget(label, center_vertically(area, 1));
}

fn draw_placeholder(f: &mut Frame, area: Rect, theme: &Theme) {
    let text = Paragraph::new("(popup active)")
        .style(Style::default().fg(theme.fg_muted))
        .alignment(Alignment::Center);
    f.render_widget(text, center_vertically(area, 1));
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    draw_progress(f, app, rows[0], theme);

    if app.command_mode {
        let cmd_line = Line::from(vec![
            Span::styled(":", Style::default().fg(theme.accent_primary).add_modifier(Modifier::BOLD)),
            Span::styled(&app.command_buffer, Style::default().fg(theme.fg_primary)),
            Span::styled("█", Style::default().fg(theme.accent_primary)), // Cursor
        ]);
        f.render_widget(Paragraph::new(cmd_line), rows[1]);
        return;
    }

    draw_help_line(f, rows[1], theme);
}

/// Import progress while populating, the last status message otherwise.
fn draw_progress(f: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    if let Some(status) = app.session.import_status() {
        if !status.finished {
            let p = status.progress;
            let mut label = format!("Loading thumbnails {}/{}", p.completed, p.total);
            if p.soft_failures > 0 {
                label.push_str(&format!(" · {} failed", p.soft_failures));
            }
            let gauge = LineGauge::default()
                .filled_style(Style::default().fg(theme.accent_primary))
                .unfilled_style(Style::default().fg(theme.border))
                .label(Span::styled(label, Style::default().fg(theme.fg_secondary)))
                .ratio(p.ratio().clamp(0.0, 1.0));
            f.render_widget(gauge, area);
            return;
        }
    }

    if let Some(status) = &app.status {
        let paragraph = Paragraph::new(status.as_str())
            .style(Style::default().fg(theme.success))
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
    }
}

fn draw_help_line(f: &mut Frame, area: Rect, theme: &Theme) {
    let sep = Span::styled(" │ ", Style::default().fg(theme.fg_muted));

    let help = Line::from(vec![
        Span::styled("1-5", Style::default().fg(theme.accent_primary)),
        Span::styled(" rate", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("space", Style::default().fg(theme.accent_primary)),
        Span::styled(" skip", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("j/k", Style::default().fg(theme.accent_primary)),
        Span::styled(" nav", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("f", Style::default().fg(theme.accent_primary)),
        Span::styled(" filter", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled(":", Style::default().fg(theme.accent_primary)),
        Span::styled(" cmd", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("?", Style::default().fg(theme.accent_primary)),
        Span::styled(" help", Style::default().fg(theme.fg_muted)),
        sep,
        Span::styled("q", Style::default().fg(theme.accent_primary)),
        Span::styled(" quit", Style::default().fg(theme.fg_muted)),
    ]);

    let paragraph = Paragraph::new(help).alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn center_vertically(area: Rect, height: u16) -> Rect {
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(area.x, y, area.width, height.min(area.height))
}

fn draw_help_popup(f: &mut Frame, app: &mut App, area: Rect, theme: &Theme) {
    let popup_width = 52.min(area.width.saturating_sub(4));
    let popup_height = 36.min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(" ★ starsort help ")
        .title_style(Style::default().fg(theme.accent_highlight).add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent_primary))
        .style(Style::default().bg(theme.bg_dark));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default().fg(theme.accent_highlight).add_modifier(Modifier::BOLD),
        ))
    };
    let entry = |key: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<14}", key), Style::default().fg(theme.accent_primary)),
            Span::styled(what, Style::default().fg(theme.fg_secondary)),
        ])
    };

    let stats = app.session.cache_stats();
    let lookups = stats.hits + stats.misses;
    let hit_rate = if lookups == 0 {
        0.0
    } else {
        stats.hits as f64 * 100.0 / lookups as f64
    };
    let cache_lines = [
        format!(
            "{} thumbnails, {:.1} MiB",
            app.session.cache().len(),
            app.session.cache().memory_usage() as f64 / (1024.0 * 1024.0)
        ),
        format!(
            "{:.0}% hits, {} evicted, {} failed decodes",
            hit_rate, stats.evictions, stats.decode_failures
        ),
        format!(
            "import {:?}, {} decodes queued",
            app.session.import_state(),
            app.session.thumbnails_pending()
        ),
    ];

    let mut help_text = vec![
        heading("Rating"),
        entry("1-5", "Rate and advance"),
        entry("space", "Skip"),
        entry("f", "Cycle rated filter"),
        Line::from(""),
        heading("Navigation"),
        entry("j/k ↑/↓", "Previous / next image"),
        entry("PgUp/PgDn", "Previous / next page"),
        entry("Home/End", "First / last image"),
        entry("+/-", "Thumbnail size"),
        entry("x", "Cancel thumbnail loading"),
        Line::from(""),
        heading("Commands (:)"),
        entry(":open <dir>", "Load, asking add or new"),
        entry(":add <dir>", "Add to current set"),
        entry(":new <dir>", "Start a new set"),
        entry(":export <dir>", "Copy filtered images"),
        entry(":filter 4+", "all, 5, 4, 4+, 3+ ..."),
        entry(":go <n>", "Jump to image n"),
        entry(":page <n>", "Images per page"),
        entry(":size <px>", "Thumbnail size"),
        entry(":reset", "Forget collection"),
        entry(":q", "Quit"),
        Line::from(""),
        heading("Cache"),
    ];
    help_text.extend(cache_lines.into_iter().map(|line| {
        Line::from(Span::styled(format!("  {}", line), Style::default().fg(theme.fg_secondary)))
    }));
    help_text.extend([
        Line::from(""),
        Line::from(Span::styled(
            "Press ? or Esc to close",
            Style::default().fg(theme.fg_muted),
        )),
    ]);

    f.render_widget(Paragraph::new(help_text), inner);
}
