//! Rendering of the five catalog views: header tabs, the active view and a status line.

use crate::app::{App, FormField, Notice, SearchFocus, Tab};
use librarian_core::assistant::client::ChatCompletion;
use librarian_core::database::types::{BookRecord, BookStatus};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Cell, Paragraph, Row, Table, TableState, Tabs, Wrap};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Main layout rendering.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once per frame from the event loop"
)]
pub fn render<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>) {
    let [tabs_area, body_area, status_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let tabs = Tabs::new(Tab::ALL.map(Tab::title))
        .select(app.tab.index())
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::bordered().title(" Library "));
    frame.render_widget(tabs, tabs_area);

    match app.tab {
        Tab::Books => render_books(frame, app, body_area),
        Tab::AddBook => render_add_book(frame, app, body_area),
        Tab::Search => render_search(frame, app, body_area),
        Tab::Assistant => render_assistant(frame, app, body_area),
        Tab::Dashboard => render_dashboard(frame, app, body_area),
    }

    render_status(frame, app, status_area);
}

fn render_books<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let title = format!(" Books ({}) ", app.books.len());
    let table = book_table(&app.books, &title);
    let mut state = TableState::default().with_selected(Some(app.books_selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_add_book<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let form = &app.add_form;
    let [title_area, author_area, isbn_area, category_area, _] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Fill(1),
    ])
    .areas(area);

    let fields = [
        (FormField::Title, "Title", form.title.as_str(), title_area),
        (FormField::Author, "Author", form.author.as_str(), author_area),
        (FormField::Isbn, "ISBN", form.isbn.as_str(), isbn_area),
    ];
    for (field, label, value, field_area) in fields {
        frame.render_widget(input(label, value, form.focus == field), field_area);
    }

    let focused = form.focus == FormField::Category;
    let category = Paragraph::new(format!("< {} >", form.category()))
        .block(input_block("Category (Left/Right)", focused));
    frame.render_widget(category, category_area);
}

fn render_search<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let search = &app.search;
    let [query_area, results_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Fill(1)]).areas(area);

    frame.render_widget(
        input(
            "Search books by title/author...",
            &search.query,
            search.focus == SearchFocus::Query,
        ),
        query_area,
    );

    if search.query.is_empty() {
        return;
    }

    let title = format!(" Results ({}) ", search.results.len());
    let table = book_table(&search.results, &title);
    let selected = (search.focus == SearchFocus::Results).then_some(search.selected);
    let mut state = TableState::default().with_selected(selected);
    frame.render_stateful_widget(table, results_area, &mut state);
}

fn render_assistant<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let assistant = &app.assistant;
    let [query_area, answer_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Fill(1)]).areas(area);

    frame.render_widget(
        input(
            "What book should I read next?",
            &assistant.query,
            assistant.pending.is_none(),
        ),
        query_area,
    );

    let block = Block::bordered().title(" AI Recommendation ");
    let answer = if let Some(pending) = &assistant.pending {
        let spinner = SPINNER
            .get(app.ticks % SPINNER.len())
            .copied()
            .unwrap_or_default();
        Paragraph::new(Line::from(vec![
            Span::styled(format!("{spinner} "), Style::default().fg(Color::Yellow)),
            Span::raw(format!("AI thinking about \"{pending}\"...")),
        ]))
    } else if let Some(last) = &assistant.last {
        Paragraph::new(vec![
            Line::from(Span::styled(
                last.query.clone(),
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(""),
            Line::from(last.answer.clone()),
        ])
    } else {
        Paragraph::new(Span::styled(
            "I like sci-fi...",
            Style::default().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(answer.wrap(Wrap { trim: false }).block(block), answer_area);
}

fn render_dashboard<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let stats = app.dashboard.stats;
    let [metrics_area, issued_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Fill(1)]).areas(area);
    let metric_areas: [Rect; 4] =
        Layout::horizontal([Constraint::Ratio(1, 4); 4]).areas(metrics_area);

    let fill_rate = stats
        .fill_rate()
        .map_or_else(|| String::from("n/a"), |rate| format!("{rate:.1}%"));
    let metrics = [
        ("Total Books", stats.total.to_string()),
        ("Available", stats.available.to_string()),
        ("Issued", stats.issued.to_string()),
        ("Fill Rate", fill_rate),
    ];
    for ((label, value), metric_area) in metrics.into_iter().zip(metric_areas) {
        let metric = Paragraph::new(Span::styled(
            value,
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .block(Block::bordered().title(format!(" {label} ")));
        frame.render_widget(metric, metric_area);
    }

    let table = book_table(&app.dashboard.recently_issued, " Recently Issued ");
    frame.render_widget(table, issued_area);
}

fn render_status<C: ChatCompletion + 'static>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let notice = match &app.notice {
        Some(Notice::Success(message)) => {
            Span::styled(format!(" {message} "), Style::default().fg(Color::Green))
        }
        Some(Notice::Failure(message)) => Span::styled(
            format!(" {message} "),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        None => Span::raw(" "),
    };
    let hints = match (app.tab, app.search.focus) {
        (Tab::AddBook, _) => "Up/Down field  Enter add",
        (Tab::Search, SearchFocus::Query) => "type to search  Enter select",
        (Tab::Search, SearchFocus::Results) => "a available  i issued  d delete  Esc back",
        (Tab::Assistant, _) => "Enter ask",
        (Tab::Books | Tab::Dashboard, _) => "",
    };
    let line = Line::from(vec![
        notice,
        Span::styled(
            format!(" {hints}  Tab view  Ctrl-R refresh  Ctrl-Q quit"),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn book_table<'rows>(books: &'rows [BookRecord], title: &str) -> Table<'rows> {
    let header = Row::new(["ID", "Title", "Author", "ISBN", "Category", "Status", "Added"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows = books.iter().map(|book| {
        let status_color = match book.status {
            BookStatus::Available => Color::Green,
            BookStatus::Issued => Color::Yellow,
        };
        Row::new([
            Cell::from(book.id.to_string()),
            Cell::from(book.title.as_str()),
            Cell::from(book.author.as_str()),
            Cell::from(book.isbn.as_str()),
            Cell::from(book.category.as_str()),
            Cell::from(Span::styled(
                book.status.as_str(),
                Style::default().fg(status_color),
            )),
            Cell::from(book.added_date.format("%Y-%m-%d %H:%M").to_string()),
        ])
    });
    let widths = [
        Constraint::Length(5),
        Constraint::Fill(3),
        Constraint::Fill(2),
        Constraint::Length(15),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(17),
    ];
    Table::new(rows, widths)
        .header(header)
        .row_highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ")
        .block(Block::bordered().title(title.to_owned()))
}

fn input<'value>(label: &str, value: &'value str, focused: bool) -> Paragraph<'value> {
    let mut line = Line::from(value);
    if focused {
        line.push_span(Span::styled("_", Style::default().fg(Color::Yellow)));
    }
    Paragraph::new(line).block(input_block(label, focused))
}

fn input_block(label: &str, focused: bool) -> Block<'static> {
    let border = if focused { Color::Yellow } else { Color::Reset };
    Block::bordered()
        .border_style(Style::default().fg(border))
        .title(format!(" {label} "))
}
