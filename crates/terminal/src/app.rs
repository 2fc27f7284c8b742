use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use librarian_core::assistant::client::ChatCompletion;
use librarian_core::assistant::recommender::Recommender;
use librarian_core::database::queries::Db;
use librarian_core::database::types::{
    BookRecord, BookStatus, DatabaseError, LibraryStats, NewBook,
};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::instrument;

/// Categories offered by the add form
pub const CATEGORIES: [&str; 5] = ["Fiction", "Non-Fiction", "Sci-Fi", "Biography", "Mystery"];

/// Number of books listed under "Recently Issued" on the dashboard
pub const RECENTLY_ISSUED_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Books,
    AddBook,
    Search,
    Assistant,
    Dashboard,
}

impl Tab {
    pub const ALL: [Self; 5] = [
        Self::Books,
        Self::AddBook,
        Self::Search,
        Self::Assistant,
        Self::Dashboard,
    ];

    #[must_use]
    #[inline]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Books => "Books",
            Self::AddBook => "Add Book",
            Self::Search => "Search",
            Self::Assistant => "AI Assistant",
            Self::Dashboard => "Dashboard",
        }
    }

    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Books => 0,
            Self::AddBook => 1,
            Self::Search => 2,
            Self::Assistant => 3,
            Self::Dashboard => 4,
        }
    }

    const fn next(self) -> Self {
        match self {
            Self::Books => Self::AddBook,
            Self::AddBook => Self::Search,
            Self::Search => Self::Assistant,
            Self::Assistant => Self::Dashboard,
            Self::Dashboard => Self::Books,
        }
    }

    const fn previous(self) -> Self {
        match self {
            Self::Books => Self::Dashboard,
            Self::AddBook => Self::Books,
            Self::Search => Self::AddBook,
            Self::Assistant => Self::Search,
            Self::Dashboard => Self::Assistant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormField {
    #[default]
    Title,
    Author,
    Isbn,
    Category,
}

impl FormField {
    const fn next(self) -> Self {
        match self {
            Self::Title => Self::Author,
            Self::Author => Self::Isbn,
            Self::Isbn | Self::Category => Self::Category,
        }
    }

    const fn previous(self) -> Self {
        match self {
            Self::Title | Self::Author => Self::Title,
            Self::Isbn => Self::Author,
            Self::Category => Self::Isbn,
        }
    }
}

#[derive(Debug, Default)]
pub struct AddBookForm {
    pub title: String,
    pub author: String,
    pub isbn: String,
    /// Index into [`CATEGORIES`]
    pub category: usize,
    pub focus: FormField,
}

impl AddBookForm {
    /// Selected category name, the first one if the index is out of range
    #[must_use]
    #[inline]
    pub fn category(&self) -> &'static str {
        CATEGORIES.get(self.category).copied().unwrap_or("Fiction")
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            FormField::Title => Some(&mut self.title),
            FormField::Author => Some(&mut self.author),
            FormField::Isbn => Some(&mut self.isbn),
            FormField::Category => None,
        }
    }

    fn to_new_book(&self) -> NewBook {
        NewBook::new(&self.title, &self.author, &self.isbn, self.category())
    }

    fn clear_text(&mut self) {
        self.title.clear();
        self.author.clear();
        self.isbn.clear();
        self.focus = FormField::Title;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchFocus {
    #[default]
    Query,
    Results,
}

#[derive(Debug, Default)]
pub struct SearchView {
    pub query: String,
    pub results: Vec<BookRecord>,
    pub selected: usize,
    pub focus: SearchFocus,
}

impl SearchView {
    #[must_use]
    #[inline]
    pub fn selected_book(&self) -> Option<&BookRecord> {
        self.results.get(self.selected)
    }
}

#[derive(Debug, Default)]
pub struct AssistantView {
    pub query: String,
    /// Query currently waiting for an answer
    pub pending: Option<String>,
    pub last: Option<RecommendationReply>,
}

#[derive(Debug, Default)]
pub struct DashboardView {
    pub stats: LibraryStats,
    pub recently_issued: Vec<BookRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Failure(String),
}

/// Answer delivered by the background recommendation task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationReply {
    pub query: String,
    pub answer: String,
}

/// Everything a key press can ask the catalog or the assistant to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddBook,
    SetStatus(i64, BookStatus),
    DeleteBook(i64),
    Search,
    Recommend(String),
    /// Re-read every view from the database
    Reload,
    /// Forget remembered recommendations, then reload
    Refresh,
}

pub struct App<C: ChatCompletion + 'static> {
    db: Db,
    recommender: Arc<Recommender<C>>,
    replies: UnboundedSender<RecommendationReply>,
    pub tab: Tab,
    pub books: Vec<BookRecord>,
    pub books_selected: usize,
    pub add_form: AddBookForm,
    pub search: SearchView,
    pub assistant: AssistantView,
    pub dashboard: DashboardView,
    pub notice: Option<Notice>,
    /// Advanced on every redraw tick, drives the progress spinner
    pub ticks: usize,
    pub should_quit: bool,
}

impl<C: ChatCompletion + 'static> App<C> {
    /// Creates the app together with the receiving end for recommendation answers, which the
    /// event loop polls next to terminal input.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn new(
        db: Db,
        recommender: Arc<Recommender<C>>,
    ) -> (Self, UnboundedReceiver<RecommendationReply>) {
        let (replies, receiver) = unbounded_channel();
        let app = Self {
            db,
            recommender,
            replies,
            tab: Tab::default(),
            books: Vec::new(),
            books_selected: 0,
            add_form: AddBookForm::default(),
            search: SearchView::default(),
            assistant: AssistantView::default(),
            dashboard: DashboardView::default(),
            notice: None,
            ticks: 0,
            should_quit: false,
        };
        (app, receiver)
    }

    /// Applies a key press to the view state and returns the action it triggers, if any
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per key press"
    )]
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c' | 'q') => {
                    self.should_quit = true;
                    None
                }
                KeyCode::Char('r') => Some(Action::Refresh),
                _ => None,
            };
        }

        match key.code {
            KeyCode::Tab => {
                self.tab = self.tab.next();
                return Some(Action::Reload);
            }
            KeyCode::BackTab => {
                self.tab = self.tab.previous();
                return Some(Action::Reload);
            }
            _ => {}
        }

        match self.tab {
            Tab::Books => self.handle_books_key(key.code),
            Tab::AddBook => self.handle_add_book_key(key.code),
            Tab::Search => self.handle_search_key(key.code),
            Tab::Assistant => self.handle_assistant_key(key.code),
            Tab::Dashboard => None,
        }
    }

    fn handle_books_key(&mut self, code: KeyCode) -> Option<Action> {
        match code {
            KeyCode::Up => self.books_selected = self.books_selected.saturating_sub(1),
            KeyCode::Down if self.books_selected + 1 < self.books.len() => {
                self.books_selected += 1;
            }
            _ => {}
        }
        None
    }

    fn handle_add_book_key(&mut self, code: KeyCode) -> Option<Action> {
        let form = &mut self.add_form;
        match code {
            KeyCode::Enter => return Some(Action::AddBook),
            KeyCode::Up => form.focus = form.focus.previous(),
            KeyCode::Down => form.focus = form.focus.next(),
            KeyCode::Left if form.focus == FormField::Category => {
                form.category = form
                    .category
                    .checked_sub(1)
                    .unwrap_or(CATEGORIES.len() - 1);
            }
            KeyCode::Right if form.focus == FormField::Category => {
                form.category = (form.category + 1) % CATEGORIES.len();
            }
            KeyCode::Char(character) => {
                if let Some(text) = form.focused_text() {
                    text.push(character);
                }
            }
            KeyCode::Backspace => {
                if let Some(text) = form.focused_text() {
                    text.pop();
                }
            }
            _ => {}
        }
        None
    }

    fn handle_search_key(&mut self, code: KeyCode) -> Option<Action> {
        let search = &mut self.search;
        match search.focus {
            SearchFocus::Query => match code {
                KeyCode::Char(character) => {
                    search.query.push(character);
                    Some(Action::Search)
                }
                KeyCode::Backspace => {
                    search.query.pop();
                    Some(Action::Search)
                }
                KeyCode::Enter | KeyCode::Down if !search.results.is_empty() => {
                    search.focus = SearchFocus::Results;
                    None
                }
                _ => None,
            },
            SearchFocus::Results => match code {
                KeyCode::Up => {
                    search.selected = search.selected.saturating_sub(1);
                    None
                }
                KeyCode::Down => {
                    if search.selected + 1 < search.results.len() {
                        search.selected += 1;
                    }
                    None
                }
                KeyCode::Esc => {
                    search.focus = SearchFocus::Query;
                    None
                }
                KeyCode::Char('a') => search
                    .selected_book()
                    .map(|book| Action::SetStatus(book.id, BookStatus::Available)),
                KeyCode::Char('i') => search
                    .selected_book()
                    .map(|book| Action::SetStatus(book.id, BookStatus::Issued)),
                KeyCode::Char('d') => search
                    .selected_book()
                    .map(|book| Action::DeleteBook(book.id)),
                _ => None,
            },
        }
    }

    fn handle_assistant_key(&mut self, code: KeyCode) -> Option<Action> {
        let assistant = &mut self.assistant;
        match code {
            KeyCode::Enter if assistant.pending.is_none() => {
                Some(Action::Recommend(assistant.query.clone()))
            }
            KeyCode::Char(character) => {
                assistant.query.push(character);
                None
            }
            KeyCode::Backspace => {
                assistant.query.pop();
                None
            }
            _ => None,
        }
    }

    /// Runs an action against the catalog or the assistant. Successful catalog changes are
    /// followed by a full reload of every view; a failed change leaves the views as they were and
    /// names the failed action in the notice line.
    #[instrument(name = "app.dispatch", skip(self))]
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per user action"
    )]
    pub async fn dispatch(&mut self, action: Action) {
        match action {
            Action::AddBook => {
                let book = self.add_form.to_new_book();
                match self.db.insert_book(&book).await {
                    Ok(id) => {
                        tracing::info!(id, "book added");
                        self.add_form.clear_text();
                        self.notice = Some(Notice::Success(String::from("Book added!")));
                        self.reload().await;
                    }
                    Err(err) => self.fail("Failed to add book", &err),
                }
            }
            Action::SetStatus(id, status) => match self.db.set_status(id, status).await {
                Ok(_) => {
                    self.notice = Some(Notice::Success(format!("Marked #{id} as {status}")));
                    self.reload().await;
                }
                Err(err) => self.fail("Failed to update book", &err),
            },
            Action::DeleteBook(id) => match self.db.delete_book(id).await {
                Ok(_) => {
                    self.notice = Some(Notice::Success(format!("Deleted #{id}")));
                    self.reload().await;
                }
                Err(err) => self.fail("Failed to delete book", &err),
            },
            Action::Search => {
                if let Err(err) = self.reload_search().await {
                    self.fail("Search failed", &err);
                }
            }
            Action::Recommend(query) => self.spawn_recommendation(query),
            Action::Reload => self.reload().await,
            Action::Refresh => {
                self.recommender.clear_cache().await;
                self.notice = Some(Notice::Success(String::from("Data refreshed")));
                self.reload().await;
            }
        }
    }

    /// Advances the spinner. While the dashboard is shown its figures are re-read on every tick,
    /// so changes made by other processes show up without switching views.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per redraw tick"
    )]
    pub async fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        if self.tab == Tab::Dashboard {
            if let Err(err) = self.reload_dashboard().await {
                self.fail("Failed to load dashboard", &err);
            }
        }
    }

    /// Re-reads every view from the database
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called on view switches and after catalog changes"
    )]
    pub async fn reload(&mut self) {
        if let Err(err) = self.try_reload().await {
            self.fail("Failed to load catalog", &err);
        }
    }

    async fn try_reload(&mut self) -> Result<(), DatabaseError> {
        self.books = self.db.fetch_books().await?;
        self.books_selected = clamp_selection(self.books_selected, self.books.len());
        self.reload_search().await?;
        self.reload_dashboard().await
    }

    async fn reload_dashboard(&mut self) -> Result<(), DatabaseError> {
        self.dashboard.stats = self.db.fetch_stats().await?;
        self.dashboard.recently_issued = self
            .db
            .fetch_recently_issued(RECENTLY_ISSUED_LIMIT)
            .await?;
        Ok(())
    }

    async fn reload_search(&mut self) -> Result<(), DatabaseError> {
        let search = &mut self.search;
        search.results = if search.query.is_empty() {
            Vec::new()
        } else {
            self.db.search_books(&search.query).await?
        };
        search.selected = clamp_selection(search.selected, search.results.len());
        if search.results.is_empty() {
            search.focus = SearchFocus::Query;
        }
        Ok(())
    }

    /// Hands the query to a background task so the other views stay usable while the model
    /// thinks
    fn spawn_recommendation(&mut self, query: String) {
        self.assistant.pending = Some(query.clone());
        let recommender = Arc::clone(&self.recommender);
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let answer = recommender.recommend(&query).await;
            if replies.send(RecommendationReply { query, answer }).is_err() {
                tracing::debug!("app closed before the recommendation arrived");
            }
        });
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per recommendation"
    )]
    pub fn receive_recommendation(&mut self, reply: RecommendationReply) {
        if self.assistant.pending.as_ref() == Some(&reply.query) {
            self.assistant.pending = None;
        }
        self.assistant.last = Some(reply);
    }

    fn fail(&mut self, context: &str, err: &DatabaseError) {
        tracing::error!("{context}: {err}");
        self.notice = Some(Notice::Failure(format!("{context}: {err}")));
    }
}

const fn clamp_selection(selected: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if selected >= len {
        len - 1
    } else {
        selected
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic,
    reason = "Tests work on fixed data and are expected to panic on failure"
)]
mod tests {
    use super::*;
    use librarian_core::assistant::errors::AssistantError;
    use librarian_core::assistant::recommender::{DEFAULT_TTL, FALLBACK_RECOMMENDATION};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every query with a fixed text, or fails if there is none
    struct CannedChat {
        answer: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl ChatCompletion for CannedChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, AssistantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(|answer| format!("{answer} for {user}"))
                .ok_or_else(|| AssistantError::MalformedResponse(String::from("offline")))
        }
    }

    async fn app_with(
        answer: Option<&'static str>,
    ) -> (
        App<CannedChat>,
        UnboundedReceiver<RecommendationReply>,
        Arc<AtomicUsize>,
    ) {
        let db = Db::init_in_memory().await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let chat = CannedChat {
            answer,
            calls: Arc::clone(&calls),
        };
        let (app, replies) = App::new(db, Arc::new(Recommender::new(chat, DEFAULT_TTL)));
        (app, replies, calls)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(character: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(character), KeyModifiers::CONTROL)
    }

    async fn type_text(app: &mut App<CannedChat>, text: &str) {
        for character in text.chars() {
            if let Some(action) = app.handle_key(press(KeyCode::Char(character))) {
                app.dispatch(action).await;
            }
        }
    }

    async fn add_book(app: &mut App<CannedChat>, title: &str, author: &str) {
        app.tab = Tab::AddBook;
        type_text(app, title).await;
        app.handle_key(press(KeyCode::Down));
        type_text(app, author).await;
        let action = app.handle_key(press(KeyCode::Enter)).unwrap();
        app.dispatch(action).await;
    }

    #[tokio::test]
    async fn test_tab_cycles_and_wraps() {
        let (mut app, _replies, _) = app_with(None).await;
        let mut seen = vec![app.tab];
        for _ in 0..5 {
            assert_eq!(app.handle_key(press(KeyCode::Tab)), Some(Action::Reload));
            seen.push(app.tab);
        }
        assert_eq!(seen[..5].to_vec(), Tab::ALL.to_vec());
        assert_eq!(app.tab, Tab::Books);

        app.handle_key(press(KeyCode::BackTab));
        assert_eq!(app.tab, Tab::Dashboard);
    }

    #[tokio::test]
    async fn test_add_book_form() {
        let (mut app, _replies, _) = app_with(None).await;
        app.tab = Tab::AddBook;
        type_text(&mut app, "Dune").await;
        app.handle_key(press(KeyCode::Down));
        type_text(&mut app, "Frank Herbert").await;
        app.handle_key(press(KeyCode::Down));
        type_text(&mut app, "978-0441").await;
        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Right));
        app.handle_key(press(KeyCode::Right));
        assert_eq!(app.add_form.category(), "Sci-Fi");

        let action = app.handle_key(press(KeyCode::Enter));
        assert_eq!(action, Some(Action::AddBook));
        app.dispatch(Action::AddBook).await;

        assert_eq!(
            app.notice,
            Some(Notice::Success(String::from("Book added!")))
        );
        assert_eq!(app.books.len(), 1);
        let book = &app.books[0];
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.isbn, "978-0441");
        assert_eq!(book.category, "Sci-Fi");
        assert_eq!(book.status, BookStatus::Available);
        assert!(app.add_form.title.is_empty());
        assert_eq!(app.dashboard.stats, LibraryStats::new(1, 1, 0));
    }

    #[tokio::test]
    async fn test_category_wraps_left() {
        let (mut app, _replies, _) = app_with(None).await;
        app.tab = Tab::AddBook;
        app.add_form.focus = FormField::Category;
        app.handle_key(press(KeyCode::Left));
        assert_eq!(app.add_form.category(), "Mystery");
        type_text(&mut app, "x").await;
        assert!(app.add_form.title.is_empty());
    }

    #[test]
    fn test_out_of_range_category_falls_back_to_first() {
        let form = AddBookForm {
            category: CATEGORIES.len(),
            ..AddBookForm::default()
        };
        assert_eq!(form.category(), "Fiction");
    }

    #[tokio::test]
    async fn test_search_and_manage() {
        let (mut app, _replies, _) = app_with(None).await;
        add_book(&mut app, "Dune", "Frank Herbert").await;
        add_book(&mut app, "Emma", "Jane Austen").await;
        add_book(&mut app, "Hyperion", "Dan Simmons").await;

        app.tab = Tab::Search;
        type_text(&mut app, "e").await;
        assert_eq!(app.search.results.len(), 3);
        type_text(&mut app, "r").await;
        assert_eq!(app.search.results.len(), 2);

        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.search.focus, SearchFocus::Results);
        app.handle_key(press(KeyCode::Down));
        let hyperion = app.search.results[1].id;
        assert_eq!(app.search.results[1].title, "Hyperion");

        let action = app.handle_key(press(KeyCode::Char('i'))).unwrap();
        assert_eq!(action, Action::SetStatus(hyperion, BookStatus::Issued));
        app.dispatch(action).await;
        assert_eq!(app.search.results[1].status, BookStatus::Issued);
        assert_eq!(app.dashboard.stats, LibraryStats::new(3, 2, 1));
        let rate = app.dashboard.stats.fill_rate().unwrap_or_default();
        assert!((rate - 66.7).abs() < 0.05);
        assert_eq!(app.dashboard.recently_issued.len(), 1);

        let action = app.handle_key(press(KeyCode::Char('a'))).unwrap();
        app.dispatch(action).await;
        assert_eq!(app.dashboard.stats, LibraryStats::new(3, 3, 0));

        let action = app.handle_key(press(KeyCode::Char('d'))).unwrap();
        assert_eq!(action, Action::DeleteBook(hyperion));
        app.dispatch(action).await;
        assert_eq!(app.books.len(), 2);
        assert_eq!(app.search.results.len(), 1);
        assert_eq!(app.search.selected, 0);
    }

    #[tokio::test]
    async fn test_empty_query_shows_no_results() {
        let (mut app, _replies, _) = app_with(None).await;
        add_book(&mut app, "Dune", "Frank Herbert").await;
        app.tab = Tab::Search;
        type_text(&mut app, "D").await;
        assert_eq!(app.search.results.len(), 1);
        let action = app.handle_key(press(KeyCode::Backspace)).unwrap();
        app.dispatch(action).await;
        assert!(app.search.results.is_empty());
        assert_eq!(app.handle_key(press(KeyCode::Enter)), None);
        assert_eq!(app.search.focus, SearchFocus::Query);
    }

    #[tokio::test]
    async fn test_dashboard_reads_fresh_counts() {
        let (mut app, _replies, _) = app_with(None).await;
        app.db
            .insert_book(&NewBook::new("Dune", "Frank Herbert", "", ""))
            .await
            .unwrap();
        assert_eq!(app.dashboard.stats, LibraryStats::default());

        app.tab = Tab::Assistant;
        let action = app.handle_key(press(KeyCode::Tab)).unwrap();
        app.dispatch(action).await;
        assert_eq!(app.tab, Tab::Dashboard);
        assert_eq!(app.dashboard.stats, LibraryStats::new(1, 1, 0));
    }

    #[tokio::test]
    async fn test_recommendation_runs_in_background() {
        let (mut app, mut replies, _) = app_with(Some("Read Dune")).await;
        app.tab = Tab::Assistant;
        type_text(&mut app, "sci-fi").await;
        let action = app.handle_key(press(KeyCode::Enter)).unwrap();
        assert_eq!(action, Action::Recommend(String::from("sci-fi")));
        app.dispatch(action).await;
        assert_eq!(app.assistant.pending.as_deref(), Some("sci-fi"));
        assert_eq!(app.handle_key(press(KeyCode::Enter)), None);

        let reply = replies.recv().await.unwrap();
        app.receive_recommendation(reply);
        assert_eq!(app.assistant.pending, None);
        assert_eq!(
            app.assistant.last,
            Some(RecommendationReply {
                query: String::from("sci-fi"),
                answer: String::from("Read Dune for sci-fi"),
            })
        );
    }

    #[tokio::test]
    async fn test_recommendation_failure_shows_fallback() {
        let (mut app, mut replies, _) = app_with(None).await;
        app.dispatch(Action::Recommend(String::from("anything"))).await;
        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.answer, FALLBACK_RECOMMENDATION);
        app.receive_recommendation(reply);
        assert!(app.notice.is_none());
    }

    #[tokio::test]
    async fn test_refresh_clears_recommendation_cache() {
        let (mut app, mut replies, calls) = app_with(Some("Read Dune")).await;
        for _ in 0..2 {
            app.dispatch(Action::Recommend(String::from("sci-fi"))).await;
            replies.recv().await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let action = app.handle_key(ctrl('r')).unwrap();
        app.dispatch(action).await;
        app.dispatch(Action::Recommend(String::from("sci-fi"))).await;
        replies.recv().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dashboard_refreshes_on_tick() {
        let (mut app, _replies, _) = app_with(None).await;
        app.tab = Tab::Dashboard;
        app.db
            .insert_book(&NewBook::new("Dune", "Frank Herbert", "", ""))
            .await
            .unwrap();
        app.tick().await;
        assert_eq!(app.dashboard.stats, LibraryStats::new(1, 1, 0));
        assert_eq!(app.ticks, 1);
    }

    #[tokio::test]
    async fn test_tick_leaves_other_views_alone() {
        let (mut app, _replies, _) = app_with(None).await;
        app.db
            .insert_book(&NewBook::new("Dune", "Frank Herbert", "", ""))
            .await
            .unwrap();
        app.tick().await;
        assert_eq!(app.dashboard.stats, LibraryStats::default());
        assert!(app.books.is_empty());
    }

    fn failure(app: &App<CannedChat>) -> &str {
        match &app.notice {
            Some(Notice::Failure(message)) => message,
            other => panic!("expected a failure notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_storage_failure_names_the_action() {
        let (mut app, _replies, _) = app_with(None).await;
        add_book(&mut app, "Dune", "Frank Herbert").await;
        let dune = app.books[0].id;
        app.db.close().await;

        app.dispatch(Action::AddBook).await;
        assert!(failure(&app).starts_with("Failed to add book: "));

        app.dispatch(Action::SetStatus(dune, BookStatus::Issued)).await;
        assert!(failure(&app).starts_with("Failed to update book: "));

        app.dispatch(Action::DeleteBook(dune)).await;
        assert!(failure(&app).starts_with("Failed to delete book: "));

        assert_eq!(app.books.len(), 1);
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let (mut app, _replies, _) = app_with(None).await;
        assert_eq!(app.handle_key(ctrl('q')), None);
        assert!(app.should_quit);
    }

    #[test]
    fn test_clamp_selection() {
        assert_eq!(clamp_selection(3, 0), 0);
        assert_eq!(clamp_selection(3, 2), 1);
        assert_eq!(clamp_selection(1, 2), 1);
    }
}
