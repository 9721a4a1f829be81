use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Widget, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;
use webbrowser::Browser;

use crate::{clock, race::RacePhase, App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub fn draw(app: &mut App, f: &mut Frame) {
    // keep the selection inside the filtered list before rendering
    let visible = app.filtered_links().len();
    if visible > 0 && app.links.selected >= visible {
        app.links.selected = visible - 1;
    }
    f.render_widget(&*app, f.area());
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Menu => render_menu(self, area, buf),
            AppState::Racing => render_race(self, area, buf),
            AppState::Results => render_results(self, area, buf),
        }
    }
}

fn render_menu(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let focused_style = Style::default()
        .patch(bold_style)
        .add_modifier(Modifier::UNDERLINED);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Length(2), // title
                Constraint::Length(2), // from
                Constraint::Length(2), // to
                Constraint::Length(1), // error / busy line
                Constraint::Min(1),    // padding
                Constraint::Length(1), // legend
            ]
            .as_ref(),
        )
        .split(area);

    let title = Paragraph::new(Span::styled(
        format!("wikirush on {}", app.host()),
        bold_style,
    ))
    .alignment(Alignment::Center);
    title.render(chunks[0], buf);

    let input_line = |label: &str, value: &str, focused: bool, busy: bool| {
        let label_style = if focused { focused_style } else { dim_style };
        let shown = if busy { "picking a random page..." } else { value };
        Paragraph::new(Line::from(vec![
            Span::styled(format!("{:<6}", label), label_style),
            Span::raw(shown.to_string()),
            Span::styled(if focused { "_" } else { "" }, bold_style),
        ]))
    };

    input_line(
        "from",
        &app.menu.from_input,
        !app.menu.focus_target,
        app.menu.randomizing_from,
    )
    .render(chunks[1], buf);
    input_line(
        "to",
        &app.menu.to_input,
        app.menu.focus_target,
        app.menu.randomizing_to,
    )
    .render(chunks[2], buf);

    if let Some(error) = &app.menu.error {
        let error_widget = Paragraph::new(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red).patch(bold_style),
        ))
        .wrap(Wrap { trim: true });
        error_widget.render(chunks[3], buf);
    }

    let legend = Paragraph::new(Span::styled(
        "(tab) switch field / (ctrl-r) random page / (enter) race / (esc)ape",
        Style::default().add_modifier(Modifier::ITALIC),
    ));
    legend.render(chunks[5], buf);
}

fn render_race(app: &App, area: Rect, buf: &mut Buffer) {
    let Some(race) = app.race.as_ref() else {
        return;
    };
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(1)
        .constraints(
            [
                Constraint::Length(1), // address line
                Constraint::Length(1), // timer line
                Constraint::Length(1), // error line
                Constraint::Min(3),    // links / visited
                Constraint::Length(1), // legend
            ]
            .as_ref(),
        )
        .split(area);

    let address = match race.current() {
        Some(page) => page.url.to_string(),
        None => race.config.start.to_string(),
    };
    let address_line = Paragraph::new(Line::from(vec![
        Span::styled(address, dim_style),
        Span::raw("   "),
        Span::styled(
            format!("target: {}", race.config.target.title()),
            bold_style,
        ),
    ]));
    address_line.render(chunks[0], buf);

    let timer_text = match race.phase() {
        RacePhase::Countdown => format!("Race starts in... {}", app.timer_text),
        _ if race.is_loading() => format!("{}  (loading)", app.timer_text),
        _ => app.timer_text.clone(),
    };
    let timer = Paragraph::new(Span::styled(timer_text, bold_style)).alignment(Alignment::Center);
    timer.render(chunks[1], buf);

    if let Some(error) = race.last_error() {
        let error_widget = Paragraph::new(Span::styled(
            format!("{}  (ctrl-r to retry)", error),
            Style::default().fg(Color::Red).patch(bold_style),
        ));
        error_widget.render(chunks[2], buf);
    }

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
        .split(chunks[3]);

    render_link_list(app, panes[0], buf);
    render_visited(app, panes[1], buf);

    let legend = Paragraph::new(Span::styled(
        "type to filter / (enter) follow / (esc) abandon",
        Style::default().add_modifier(Modifier::ITALIC),
    ));
    legend.render(chunks[4], buf);
}

fn render_link_list(app: &App, area: Rect, buf: &mut Buffer) {
    let links = app.filtered_links();
    let title = if app.links.filter.is_empty() {
        format!("links ({})", links.len())
    } else {
        format!("links ({}) filter: {}", links.len(), app.links.filter)
    };

    // scroll the selection into view on small panes
    let visible_rows = area.height.saturating_sub(2) as usize;
    let first = if visible_rows == 0 {
        0
    } else {
        app.links.selected.saturating_sub(visible_rows - 1)
    };

    let items: Vec<ListItem> = links
        .iter()
        .enumerate()
        .skip(first)
        .map(|(idx, name)| {
            let display = name.replace('_', " ");
            if idx == app.links.selected {
                ListItem::new(Span::styled(
                    format!("> {}", display),
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ))
            } else {
                ListItem::new(Span::raw(format!("  {}", display)))
            }
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    list.render(area, buf);
}

fn render_visited(app: &App, area: Rect, buf: &mut Buffer) {
    let Some(race) = app.race.as_ref() else {
        return;
    };
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let max_width = area.width.saturating_sub(4) as usize;

    let mut items: Vec<ListItem> = Vec::with_capacity(race.visited().len());
    let mut previous = None;
    for entry in race.visited() {
        let delta = match previous {
            Some(at) => format!("+{}", clock::format_duration(entry.visited_at - at)),
            None => String::new(),
        };
        previous = Some(entry.visited_at);

        let mut title = entry.title.replace('_', " ");
        while title.width() > max_width {
            title.pop();
        }
        items.push(ListItem::new(Line::from(vec![
            Span::raw(title),
            Span::raw(" "),
            Span::styled(delta, dim_style),
        ])));
    }

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("visited"));
    list.render(area, buf);
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let Some(race) = app.race.as_ref() else {
        return;
    };
    let bold_style = Style::default().add_modifier(Modifier::BOLD);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Length(2), // headline
                Constraint::Length(2), // time
                Constraint::Min(1),    // route
                Constraint::Length(1), // legend
            ]
            .as_ref(),
        )
        .split(area);

    let headline = Paragraph::new(Span::styled(
        format!(
            "You made it from {} to {}!",
            race.config.start.title(),
            race.config.target.title()
        ),
        Style::default().fg(Color::Green).patch(bold_style),
    ))
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });
    headline.render(chunks[0], buf);

    let time = Paragraph::new(Span::styled(app.timer_text.clone(), bold_style))
        .alignment(Alignment::Center);
    time.render(chunks[1], buf);

    let mut route: Vec<ListItem> = race
        .visited()
        .iter()
        .map(|entry| ListItem::new(Span::raw(entry.title.replace('_', " "))))
        .collect();
    route.push(ListItem::new(Span::styled(
        race.config.target.title(),
        Style::default().fg(Color::Green),
    )));
    let route_list =
        List::new(route).block(Block::default().borders(Borders::ALL).title("your route"));
    route_list.render(chunks[2], buf);

    let legend = Paragraph::new(Span::styled(
        String::from(if Browser::is_available() {
            "(r)ematch / (n)ew race / (t)weet / (esc)ape"
        } else {
            "(r)ematch / (n)ew race / (esc)ape"
        }),
        Style::default().add_modifier(Modifier::ITALIC),
    ));
    legend.render(chunks[3], buf);
}
