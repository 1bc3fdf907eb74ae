use parley_client::{state::Toast, ToastLevel};
use parley_common::{Message, ReceiptState, UserId};
use ratatui::{
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame,
};

use crate::{
    app::{App, Mode, Popup, Tab},
    command::USAGE,
};

pub fn draw(frame: &mut Frame, app: &App) {
    let [body, status_line] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());
    match app.state.identity() {
        Some(identity) => {
            let viewer = identity.id();
            let [sidebar, main] =
                Layout::horizontal([Constraint::Percentage(30), Constraint::Min(20)]).areas(body);
            draw_sidebar(frame, app, viewer, sidebar);
            draw_thread(frame, app, viewer, main);
            if let Some(popup) = &app.popup {
                draw_popup(frame, app, viewer, popup, body);
            }
        }
        None => draw_welcome(frame, app, body),
    }
    draw_status_line(frame, app, status_line);
}

fn draw_welcome(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from("parley".bold()),
        Line::default(),
        Line::from(":login <email> <password>"),
        Line::from(":signup <name> <email> <password> [picture]"),
        Line::from(":quit"),
    ];
    if app.state.loading().auth {
        lines.push(Line::default());
        lines.push(Line::from("signing in...".italic()));
    }
    let area = centered(area, 60, 40);
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title(" welcome ")),
        area,
    );
}

fn draw_sidebar(frame: &mut Frame, app: &App, viewer: &UserId, area: Rect) {
    let [tabs_area, list_area] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(area);
    let tabs = Tabs::new(Tab::ALL.iter().map(|tab| tab.title()))
        .select(Tab::ALL.iter().position(|tab| *tab == app.tab).unwrap_or(0))
        .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
    frame.render_widget(tabs, tabs_area);

    let selected = app.state.selected_id();
    let items = app.visible_chats().into_iter().map(|chat| {
        let unread = app
            .state
            .notifications()
            .iter()
            .filter(|n| n.chat_id() == &chat.identifier)
            .count();
        let mut title = vec![Span::raw(chat.display_name(viewer).to_string()).bold()];
        if unread > 0 {
            title.push(Span::raw(format!(" ({unread})")).fg(Color::Green));
        }
        if selected == Some(&chat.identifier) {
            title.push(Span::raw(" *").fg(Color::Cyan));
        }
        let detail = match (app.tab, chat.preview()) {
            (Tab::Communities, _) => chat.description.as_deref().unwrap_or_default().to_owned(),
            (_, Some(preview)) => preview,
            (_, None) => String::new(),
        };
        ListItem::new(vec![Line::from(title), Line::from(detail.dark_gray())])
    });
    let mut title = format!(" {} ", app.tab.title());
    if app.state.loading().chats {
        title.push_str("(loading) ");
    }
    let list = List::new(items)
        .block(Block::bordered().title(title))
        .highlight_symbol("> ")
        .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if app.popup.is_none() {
        list_state.select(Some(app.cursor));
    }
    frame.render_stateful_widget(list, list_area, &mut list_state);
}

fn tick_mark(message: &Message, viewer: &UserId) -> Option<Span<'static>> {
    match message.receipt(viewer)? {
        ReceiptState::Sent => Some(Span::raw(" ✓").dark_gray()),
        ReceiptState::Seen => Some(Span::raw(" ✓✓").fg(Color::Cyan)),
    }
}

fn message_line(message: &Message, viewer: &UserId) -> Line<'static> {
    let time = message.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    let sender = if message.is_from(viewer) {
        Span::raw("you").fg(Color::Yellow)
    } else {
        Span::raw(message.sender.display_name.to_string()).fg(Color::Magenta)
    };
    let mut spans = vec![Span::raw(format!("[{time}] ")).dark_gray(), sender, Span::raw(": ")];
    if let Some(media) = message.media() {
        spans.push(Span::raw(format!("[{}] {} ", media.kind.as_str(), media.url)).italic());
    }
    spans.push(Span::raw(message.content.to_string()));
    if let Some(mark) = tick_mark(message, viewer) {
        spans.push(mark);
    }
    Line::from(spans)
}

fn draw_thread(frame: &mut Frame, app: &App, viewer: &UserId, area: Rect) {
    let [thread_area, composer_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(area);
    let Some(chat) = app.state.selected() else {
        let hint = Paragraph::new("select a conversation with <CR>, or :help")
            .block(Block::bordered());
        frame.render_widget(hint, area);
        return;
    };

    let mut title = format!(" {} ", chat.display_name(viewer));
    if chat.is_group {
        // receipts only say that someone other than you has read the message
        title.push_str("(group, ✓✓ = seen by someone) ");
    }
    if app.state.loading().history {
        title.push_str("(loading) ");
    }
    let lines: Vec<Line> = app
        .state
        .messages()
        .iter()
        .map(|message| message_line(message, viewer))
        .collect();
    let visible = usize::from(thread_area.height.saturating_sub(2));
    let scroll = lines.len().saturating_sub(visible);
    let thread = Paragraph::new(Text::from(lines))
        .block(Block::bordered().title(title))
        .scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0));
    frame.render_widget(thread, thread_area);

    let composing = app.mode == Mode::Insert;
    let mut composer_title = String::from(" message ");
    if app.state.loading().upload {
        composer_title.push_str("(uploading) ");
    }
    let composer = Paragraph::new(app.state.draft.as_str())
        .wrap(Wrap { trim: false })
        .block(
            Block::bordered()
                .title(composer_title)
                .border_style(if composing {
                    Style::new().fg(Color::Yellow)
                } else {
                    Style::new()
                }),
        );
    frame.render_widget(composer, composer_area);
    if composing {
        let width = u16::try_from(app.state.draft.chars().count()).unwrap_or(u16::MAX);
        frame.set_cursor_position((
            composer_area.x.saturating_add(1).saturating_add(width),
            composer_area.y + 1,
        ));
    }
}

fn popup_list<'a>(
    frame: &mut Frame,
    area: Rect,
    title: &'a str,
    items: Vec<ListItem<'a>>,
    cursor: usize,
) {
    let list = List::new(items)
        .block(Block::bordered().title(title))
        .highlight_symbol("> ")
        .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default().with_selected(Some(cursor));
    frame.render_widget(Clear, area);
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_popup(frame: &mut Frame, app: &App, viewer: &UserId, popup: &Popup, area: Rect) {
    let area = centered(area, 60, 60);
    match popup {
        Popup::Notifications => {
            let items = app
                .state
                .notifications()
                .iter()
                .map(|n| ListItem::new(n.describe(app.state.find_chat(n.chat_id()))))
                .collect();
            popup_list(frame, area, " notifications ", items, app.cursor);
        }
        Popup::Search => {
            let picked = app.state.group_members();
            let mut items: Vec<ListItem> = app
                .state
                .search()
                .results
                .iter()
                .map(|user| {
                    let mark = if picked.iter().any(|p| p.identifier == user.identifier) {
                        "+ "
                    } else {
                        "  "
                    };
                    let email = user.email.as_deref().unwrap_or_default();
                    ListItem::new(format!("{mark}{} <{email}>", user.display_name))
                })
                .collect();
            if items.is_empty() {
                let text = if app.state.loading().search {
                    "searching..."
                } else {
                    "no results"
                };
                items.push(ListItem::new(text.italic()));
            }
            popup_list(frame, area, " search: <CR> chat, a add to group ", items, app.cursor);
        }
        Popup::GroupInfo => {
            let Some(chat) = app.state.selected() else {
                return;
            };
            let admin = chat.admin.as_ref().map(|admin| admin.id());
            let mut lines = vec![Line::from(chat.display_name(viewer).to_string().bold())];
            if let Some(description) = &chat.description {
                lines.push(Line::from(description.to_string()));
            }
            lines.push(Line::default());
            for user in &chat.users {
                let mut line = vec![Span::raw(user.display_name.to_string())];
                if Some(&user.identifier) == admin {
                    line.push(Span::raw(" (admin)").fg(Color::Yellow));
                }
                lines.push(Line::from(line));
            }
            lines.push(Line::default());
            let hint = if chat.is_admin(viewer) {
                ":leave to exit, :delete to delete"
            } else {
                ":leave to exit"
            };
            lines.push(Line::from(hint.dark_gray()));
            frame.render_widget(Clear, area);
            frame.render_widget(
                Paragraph::new(lines).block(Block::bordered().title(" group info ")),
                area,
            );
        }
        Popup::Statuses => {
            let board = app.state.status_board();
            let mut items: Vec<ListItem> = board
                .groups()
                .map(|group| {
                    let name = if board.mine.as_ref() == Some(group) {
                        "my status".to_owned()
                    } else {
                        group.user.display_name.to_string()
                    };
                    let latest = group
                        .latest()
                        .and_then(|item| item.caption.as_deref())
                        .unwrap_or_default()
                        .to_owned();
                    ListItem::new(vec![
                        Line::from(format!("{name} ({})", group.items.len())),
                        Line::from(latest.dark_gray()),
                    ])
                })
                .collect();
            if items.is_empty() {
                items.push(ListItem::new(
                    "no statuses, :status <url> [caption] posts one".italic(),
                ));
            }
            popup_list(frame, area, " statuses ", items, app.cursor);
        }
        Popup::Viewer(viewer_state) => {
            let Some(item) = viewer_state.current() else {
                return;
            };
            let [gauge_area, body_area] =
                Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(area);
            frame.render_widget(Clear, area);
            let label = format!("{}/{}", viewer_state.index() + 1, viewer_state.len());
            frame.render_widget(
                Gauge::default()
                    .percent(u16::from(viewer_state.progress()))
                    .label(label)
                    .gauge_style(Style::new().fg(Color::Cyan)),
                gauge_area,
            );
            let time = item.timestamp.with_timezone(&chrono::Local).format("%H:%M");
            let mut lines = vec![
                Line::from(format!("{} at {time}", item.user.display_name).bold()),
                Line::from(item.media_url.to_string().underlined()),
            ];
            if let Some(caption) = &item.caption {
                lines.push(Line::default());
                lines.push(Line::from(caption.to_string()));
            }
            frame.render_widget(
                Paragraph::new(lines)
                    .wrap(Wrap { trim: true })
                    .block(
                        Block::new()
                            .borders(Borders::ALL)
                            .title(" h/l prev/next, <Esc> close "),
                    ),
                body_area,
            );
        }
        Popup::Help => {
            let mut lines: Vec<Line> = [
                "j/k move, gg/G first/last, <CR> open, <Esc> back",
                "<Tab> next tab, i compose, : command, / search",
                "n notifications, s statuses, gi group info, r refresh, q quit",
                "",
            ]
            .into_iter()
            .map(Line::from)
            .collect();
            lines.extend(USAGE.iter().map(|(_, usage)| Line::from(*usage)));
            frame.render_widget(Clear, area);
            frame.render_widget(
                Paragraph::new(lines).block(Block::bordered().title(" help ")),
                area,
            );
        }
    }
}

fn toast_style(toast: &Toast) -> Style {
    let color = match toast.level {
        ToastLevel::Info => Color::Blue,
        ToastLevel::Success => Color::Green,
        ToastLevel::Warning => Color::Yellow,
        ToastLevel::Error => Color::Red,
    };
    Style::new().fg(color)
}

fn draw_status_line(frame: &mut Frame, app: &App, area: Rect) {
    if app.mode == Mode::Command {
        frame.render_widget(Paragraph::new(format!(":{}", app.command_line)), area);
        let width = u16::try_from(app.command_line.chars().count()).unwrap_or(u16::MAX);
        frame.set_cursor_position((area.x.saturating_add(1).saturating_add(width), area.y));
        return;
    }
    let mode = match app.mode {
        Mode::Normal => " NORMAL ",
        Mode::Insert => " INSERT ",
        Mode::Command => " COMMAND ",
    };
    let mut spans = vec![Span::raw(mode).reversed(), Span::raw(" ")];
    if app.state.identity().is_some() {
        spans.push(if app.state.is_channel_live() {
            Span::raw("● live ").fg(Color::Green)
        } else {
            Span::raw("○ offline ").dark_gray()
        });
        let unread = app.state.notifications().len();
        if unread > 0 {
            spans.push(Span::raw(format!("{unread} new ")).fg(Color::Green));
        }
    }
    let pending: String = app
        .pending_keys()
        .iter()
        .filter_map(|key| key.typed_char())
        .collect();
    if !pending.is_empty() {
        spans.push(Span::raw(format!("{pending} ")).dark_gray());
    }
    if let Some(toast) = app.state.toasts().next_back() {
        spans.push(Span::styled(toast.text.clone(), toast_style(toast)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    area
}
