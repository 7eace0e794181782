//! Book collection mirror
//!
//! [`BookCollection`] keeps an in-memory replica of the signed-in user's
//! books and runs load/create/update/remove against the backend. The mirror
//! changes only after the server confirms an operation; a failed call leaves
//! it exactly as it was.

use crate::tracker::auth::SessionManager;
use crate::tracker::book::api::BookApi;
use crate::tracker::book::listener::{BookListener, EmptyBookListener};
use crate::tracker::book::models::{BookPayload, BookResource};
use crate::tracker::cancellation::LivenessToken;
use crate::tracker::error::ClientError;
use crate::tracker::notice::NoticeBoard;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct MirrorState {
    books: Vec<BookResource>,
    /// Number of `load()` requests still pending.
    pending_loads: usize,
}

/// Counts one pending fetch; released when it finishes, fails, or is dropped.
struct LoadingGuard<'a> {
    state: &'a Mutex<MirrorState>,
}

impl<'a> LoadingGuard<'a> {
    /// Returns the guard and whether this fetch started the loading phase.
    fn start(state: &'a Mutex<MirrorState>) -> (Self, bool) {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.pending_loads += 1;
        let first = guard.pending_loads == 1;
        drop(guard);
        (Self { state }, first)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending_loads = state.pending_loads.saturating_sub(1);
    }
}

/// Marks one book id as having an operation in flight.
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(ids: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self, ClientError> {
        let mut set = ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id.to_string()) {
            return Err(ClientError::Busy(id.to_string()));
        }
        Ok(Self {
            ids,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Mirror of the user's book collection.
///
/// One instance per screen. [`Self::detach`] when the screen goes away so
/// late completions are discarded. Once the session is gone the mirror is
/// emptied by the next operation, so it never shows a previous user's books.
pub struct BookCollection {
    session: Arc<SessionManager>,
    api: BookApi,
    listener: Arc<dyn BookListener>,
    notices: Arc<NoticeBoard>,
    liveness: LivenessToken,
    state: Mutex<MirrorState>,
    in_flight: Mutex<HashSet<String>>,
}

impl BookCollection {
    pub fn new(session: Arc<SessionManager>, notices: Arc<NoticeBoard>) -> Self {
        Self::with_listener(session, notices, Arc::new(EmptyBookListener))
    }

    pub fn with_listener(
        session: Arc<SessionManager>,
        notices: Arc<NoticeBoard>,
        listener: Arc<dyn BookListener>,
    ) -> Self {
        let api = BookApi::new(session.transport());
        Self {
            session,
            api,
            listener,
            notices,
            liveness: LivenessToken::new(),
            state: Mutex::new(MirrorState::default()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MirrorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the mirror, in server order.
    pub fn books(&self) -> Vec<BookResource> {
        self.state().books.clone()
    }

    pub fn get(&self, id: &str) -> Option<BookResource> {
        self.state().books.iter().find(|b| b.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while at least one `load()` is pending.
    pub fn is_loading(&self) -> bool {
        self.state().pending_loads > 0
    }

    /// Whether an operation on `id` is pending; UIs disable its controls.
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Stops this collection from applying any further results.
    pub fn detach(&self) {
        debug!("[BookSync] collection detached");
        self.liveness.cancel();
    }

    pub fn is_attached(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Replaces the mirror with the server's list.
    pub async fn load(&self) -> Result<(), ClientError> {
        self.precheck("load books").await?;
        info!("[BookSync] 🔄 loading collection");

        let (loading, started) = LoadingGuard::start(&self.state);
        if started {
            self.listener.on_loading_changed(true).await;
        }
        let result = self.api.list_mine().await;
        drop(loading);
        if !self.is_loading() {
            self.listener.on_loading_changed(false).await;
        }

        let books = match result {
            Ok(books) => books,
            Err(e) => return Err(self.fail(ClientError::Fetch(Box::new(e))).await),
        };
        self.ensure_attached()?;

        let count = {
            let mut state = self.state();
            state.books = dedupe(books);
            state.books.len()
        };
        info!("[BookSync] ✅ collection loaded, {} books", count);
        self.notify_changed().await;
        Ok(())
    }

    /// Creates a book and appends the server's canonical copy.
    pub async fn create(&self, payload: &BookPayload) -> Result<BookResource, ClientError> {
        self.precheck("create book").await?;

        let book = match self.api.create(payload).await {
            Ok(book) => book,
            Err(e) => return Err(self.fail(e).await),
        };
        self.ensure_attached()?;

        {
            let mut state = self.state();
            match state.books.iter_mut().find(|b| b.id == book.id) {
                Some(existing) => {
                    warn!("[BookSync] server returned existing id {} on create, replacing entry", book.id);
                    *existing = book.clone();
                }
                None => state.books.push(book.clone()),
            }
        }
        self.notify_changed().await;
        Ok(book)
    }

    /// Updates book `id`; the mirror entry is replaced by the server response.
    ///
    /// Ids absent from the mirror fail with `NotFound` without a request.
    pub async fn update(&self, id: &str, payload: &BookPayload) -> Result<BookResource, ClientError> {
        self.precheck("update book").await?;
        if self.get(id).is_none() {
            return Err(self.fail(ClientError::NotFound(id.to_string())).await);
        }
        let _in_flight = match InFlight::acquire(&self.in_flight, id) {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(e).await),
        };

        let book = match self.api.update(id, payload).await {
            Ok(book) => book,
            Err(e) => return Err(self.fail(e).await),
        };
        if book.id != id {
            let err = ClientError::decode(
                "update book",
                format!("server answered with id {} for book {}", book.id, id),
            );
            return Err(self.fail(err).await);
        }
        self.ensure_attached()?;

        let replaced = {
            let mut state = self.state();
            match state.books.iter_mut().find(|b| b.id == id) {
                Some(entry) => {
                    *entry = book.clone();
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.notify_changed().await;
        } else {
            warn!("[BookSync] book {} left the mirror while its update was pending", id);
        }
        Ok(book)
    }

    /// Deletes book `id` and drops it from the mirror.
    pub async fn remove(&self, id: &str) -> Result<(), ClientError> {
        self.precheck("remove book").await?;
        let _in_flight = match InFlight::acquire(&self.in_flight, id) {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(e).await),
        };

        if let Err(e) = self.api.delete(id).await {
            return Err(self.fail(e).await);
        }
        self.ensure_attached()?;

        self.state().books.retain(|b| b.id != id);
        self.notify_changed().await;
        Ok(())
    }

    async fn precheck(&self, operation: &str) -> Result<(), ClientError> {
        self.ensure_attached()?;
        if let Err(e) = self.session.require_user(operation) {
            self.forget_previous_user().await;
            return Err(self.fail(e).await);
        }
        Ok(())
    }

    /// Empties the mirror left behind by a session that has ended.
    async fn forget_previous_user(&self) {
        let dropped = std::mem::take(&mut self.state().books).len();
        if dropped > 0 {
            info!("[BookSync] session ended, dropped {} mirrored books", dropped);
            self.notify_changed().await;
        }
    }

    fn ensure_attached(&self) -> Result<(), ClientError> {
        if self.liveness.is_cancelled() {
            debug!("[BookSync] collection detached, discarding result");
            return Err(ClientError::Cancelled);
        }
        Ok(())
    }

    /// Surfaces a failure to the user (when still attached) and hands it back.
    pub(crate) async fn fail(&self, err: ClientError) -> ClientError {
        if self.liveness.is_alive() {
            let message = err.user_message();
            warn!("[BookSync] operation failed: {}", err);
            self.notices.post(message.clone());
            self.listener.on_operation_failed(message).await;
        }
        err
    }

    async fn notify_changed(&self) {
        let json = serde_json::to_string(&self.state().books);
        match json {
            Ok(json) => self.listener.on_book_list_changed(json).await,
            Err(e) => warn!("[BookSync] could not serialise mirror for listener: {}", e),
        }
    }
}

/// Keeps the first occurrence of every id.
fn dedupe(books: Vec<BookResource>) -> Vec<BookResource> {
    let mut seen = HashSet::new();
    let total = books.len();
    let unique: Vec<_> = books
        .into_iter()
        .filter(|b| seen.insert(b.id.clone()))
        .collect();
    if unique.len() != total {
        warn!(
            "[BookSync] server list had {} duplicate ids, kept first occurrences",
            total - unique.len()
        );
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::book::models::{BookDraft, BookStatus, ShapingOptions};
    use crate::tracker::store::{CredentialStore, MemoryCredentialStore, TOKEN_KEY, USER_KEY};
    use crate::tracker::test_support::{init_test_logger, FakeTransport};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use reqwest::Method;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Changed(usize),
        Loading(bool),
        Failed(String),
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BookListener for RecordingListener {
        async fn on_book_list_changed(&self, books_json: String) {
            let books: Vec<serde_json::Value> = serde_json::from_str(&books_json).unwrap();
            self.events.lock().unwrap().push(Event::Changed(books.len()));
        }
        async fn on_loading_changed(&self, loading: bool) {
            self.events.lock().unwrap().push(Event::Loading(loading));
        }
        async fn on_operation_failed(&self, message: String) {
            self.events.lock().unwrap().push(Event::Failed(message));
        }
    }

    struct Fixture {
        transport: Arc<FakeTransport>,
        listener: Arc<RecordingListener>,
        notices: Arc<NoticeBoard>,
        books: BookCollection,
    }

    async fn signed_in() -> Fixture {
        init_test_logger();
        let transport = FakeTransport::new();
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(TOKEN_KEY, "tok").await.unwrap();
        store
            .set(USER_KEY, r#"{"id":7,"name":"Ana","email":"a@x.com"}"#)
            .await
            .unwrap();
        let session = Arc::new(SessionManager::new(transport.clone(), store));
        assert!(session.bootstrap().await.unwrap());
        fixture(transport, session)
    }

    fn signed_out() -> Fixture {
        init_test_logger();
        let transport = FakeTransport::new();
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Arc::new(MemoryCredentialStore::new()),
        ));
        fixture(transport, session)
    }

    fn fixture(transport: Arc<FakeTransport>, session: Arc<SessionManager>) -> Fixture {
        let listener = Arc::new(RecordingListener::default());
        let notices = Arc::new(NoticeBoard::default());
        let books = BookCollection::with_listener(session, notices.clone(), listener.clone());
        Fixture {
            transport,
            listener,
            notices,
            books,
        }
    }

    fn dune() -> serde_json::Value {
        json!({ "id": "1", "title": "Dune", "status": "WantToRead", "ownerId": 7 })
    }

    fn foo() -> serde_json::Value {
        json!({
            "id": "9",
            "title": "Foo",
            "status": "Read",
            "rating": 4,
            "completionDate": "2024-01-01",
            "ownerId": 7
        })
    }

    fn read_payload() -> BookPayload {
        BookDraft {
            title: "Foo".into(),
            status: BookStatus::Read,
            rating: 4,
            completion_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        }
        .shape(7, &ShapingOptions::new(false))
        .unwrap()
    }

    fn unread_payload(title: &str) -> BookPayload {
        BookDraft {
            title: title.into(),
            status: BookStatus::Reading,
            rating: 3,
            ..Default::default()
        }
        .shape(7, &ShapingOptions::new(false))
        .unwrap()
    }

    async fn loaded_with(f: &Fixture, books: serde_json::Value) {
        f.transport.push_ok(books);
        f.books.load().await.unwrap();
    }

    #[tokio::test]
    async fn load_requires_session_and_sends_nothing() {
        let f = signed_out();
        assert_eq!(f.books.load().await, Err(ClientError::NotAuthenticated));
        assert_eq!(f.transport.request_count(), 0);
        assert_eq!(f.notices.message().as_deref(), Some("not signed in"));
        assert_eq!(
            f.listener.events(),
            [Event::Failed("not signed in".into())]
        );
    }

    #[tokio::test]
    async fn overlapping_loads_stay_loading_until_the_last_finishes() {
        let f = signed_in().await;
        let gate = f.transport.hold();
        f.transport.push_ok(json!([dune()]));
        f.transport.push_ok(json!([dune(), foo()]));

        let (first, second, mid_loading) = tokio::join!(f.books.load(), f.books.load(), async {
            tokio::task::yield_now().await;
            gate.notify_one();
            while f.books.is_empty() {
                tokio::task::yield_now().await;
            }
            let loading = f.books.is_loading();
            gate.notify_one();
            loading
        });

        assert_eq!((first, second), (Ok(()), Ok(())));
        assert!(mid_loading);
        assert!(!f.books.is_loading());
        let toggles: Vec<_> = f
            .listener
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Loading(_)))
            .collect();
        assert_eq!(toggles, [Event::Loading(true), Event::Loading(false)]);
    }

    #[tokio::test]
    async fn ended_session_empties_the_mirror() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune(), foo()])).await;
        f.books.session().sign_out().await.unwrap();
        let sent = f.transport.request_count();

        let err = f.books.update("1", &unread_payload("Dune")).await.unwrap_err();

        assert_eq!(err, ClientError::NotAuthenticated);
        assert!(f.books.is_empty());
        assert_eq!(f.transport.request_count(), sent);
        assert_eq!(f.listener.events().last(), Some(&Event::Failed("not signed in".into())));
    }

    #[tokio::test]
    async fn load_replaces_mirror_and_toggles_loading() {
        let f = signed_in().await;
        loaded_with(&f, json!([foo()])).await;

        loaded_with(&f, json!([dune()])).await;

        let expected: Vec<BookResource> = serde_json::from_value(json!([dune()])).unwrap();
        assert_eq!(f.books.books(), expected);
        assert!(!f.books.is_loading());
        assert_eq!(
            f.listener.events()[3..],
            [Event::Loading(true), Event::Loading(false), Event::Changed(1)]
        );
        let req = &f.transport.requests()[0];
        assert_eq!((req.method.clone(), req.path.as_str()), (Method::GET, "/books/mine"));
        assert_eq!(req.authorization.as_deref(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn failed_load_keeps_mirror_and_clears_loading() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune()])).await;
        let before = f.books.books();

        f.transport.push_status(500, json!({ "message": "db down" }));
        let err = f.books.load().await.unwrap_err();

        assert!(matches!(err, ClientError::Fetch(_)));
        assert_eq!(f.books.books(), before);
        assert!(!f.books.is_loading());
        assert_eq!(f.notices.message().as_deref(), Some("db down"));
        assert_eq!(f.listener.events().last(), Some(&Event::Failed("db down".into())));
    }

    #[tokio::test]
    async fn load_drops_duplicate_ids() {
        let f = signed_in().await;
        let mut second = dune();
        second["title"] = json!("Dune Messiah");
        loaded_with(&f, json!([dune(), second])).await;

        assert_eq!(f.books.len(), 1);
        assert_eq!(f.books.get("1").unwrap().title, "Dune");
    }

    #[tokio::test]
    async fn create_appends_server_copy() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune()])).await;

        f.transport.push_ok(foo());
        let created = f.books.create(&read_payload()).await.unwrap();

        assert_eq!(created.id, "9");
        assert_eq!(f.books.len(), 2);
        let expected: BookResource = serde_json::from_value(foo()).unwrap();
        assert_eq!(f.books.get("9"), Some(expected));

        let req = f.transport.requests().pop().unwrap();
        assert_eq!((req.method, req.path.as_str()), (Method::POST, "/books"));
        assert!(req.body.unwrap().get("id").is_none());
    }

    #[tokio::test]
    async fn create_sends_shaped_body_for_unread_books() {
        let f = signed_in().await;
        f.transport.push_ok(json!({ "id": "2", "title": "Emma", "status": "Reading", "ownerId": 7 }));
        f.books.create(&unread_payload("Emma")).await.unwrap();

        let body = f.transport.requests()[0].body.clone().unwrap();
        let obj = body.as_object().unwrap();
        assert!(!obj.contains_key("rating"));
        assert!(!obj.contains_key("completionDate"));
    }

    #[tokio::test]
    async fn failed_create_leaves_mirror_untouched() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune()])).await;
        let before = f.books.books();

        f.transport.push_connection_error();
        let err = f.books.create(&read_payload()).await.unwrap_err();

        assert!(matches!(err, ClientError::Network(_)));
        assert_eq!(f.books.books(), before);
        assert!(f.notices.current().is_some());
    }

    #[tokio::test]
    async fn update_replaces_entry_verbatim() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune(), foo()])).await;

        let server = json!({ "id": "1", "title": "Dune (reread)", "status": "Reading", "ownerId": 7 });
        f.transport.push_ok(server.clone());
        f.books.update("1", &unread_payload("Dune (reread)")).await.unwrap();

        assert_eq!(f.books.len(), 2);
        let expected: BookResource = serde_json::from_value(server).unwrap();
        assert_eq!(f.books.books()[0], expected);

        let req = f.transport.requests().pop().unwrap();
        assert_eq!((req.method, req.path.as_str()), (Method::PUT, "/books/1"));
    }

    #[tokio::test]
    async fn update_unknown_id_short_circuits() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune()])).await;
        let sent = f.transport.request_count();

        let err = f.books.update("404", &unread_payload("x")).await.unwrap_err();

        assert_eq!(err, ClientError::NotFound("404".into()));
        assert_eq!(f.transport.request_count(), sent);
    }

    #[tokio::test]
    async fn failed_update_leaves_mirror_untouched() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune()])).await;
        let before = f.books.books();

        f.transport.push_status(422, json!({ "error": "bad status" }));
        let err = f.books.update("1", &unread_payload("Dune 2")).await.unwrap_err();

        assert_eq!(err.user_message(), "bad status");
        assert_eq!(f.books.books(), before);
        assert!(!f.books.is_in_flight("1"));
    }

    #[tokio::test]
    async fn remove_drops_entry() {
        let f = signed_in().await;
        loaded_with(&f, json!([dune(), foo()])).await;

        f.transport.push_ok(json!("ok"));
        f.books.remove("9").await.unwrap();

        assert_eq!(f.books.len(), 1);
        assert!(f.books.get("9").is_none());
        let req = f.transport.requests().pop().unwrap();
        assert_eq!((req.method, req.path.as_str()), (Method::DELETE, "/books/9"));
    }

    #[tokio::test]
    async fn failed_remove_keeps_entry() {
        let f = signed_in().await;
        loaded_with(&f, json!([foo()])).await;

        f.transport.push_status(500, json!({ "error": "internal" }));
        let err = f.books.remove("9").await.unwrap_err();

        assert!(matches!(err, ClientError::Server { status: 500, .. }));
        assert!(f.books.get("9").is_some());
    }

    #[tokio::test]
    async fn overlapping_operations_on_one_book_are_refused() {
        let f = signed_in().await;
        loaded_with(&f, json!([foo()])).await;
        let gate = f.transport.hold();
        f.transport.push_ok(json!("ok"));

        let payload = read_payload();

        let (first, second, _) = tokio::join!(
            f.books.remove("9"),
            f.books.update("9", &payload),
            async {
                tokio::task::yield_now().await;
                gate.notify_one();
            }
        );

        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(ClientError::Busy("9".into())));
        assert!(f.books.is_empty());
        assert!(!f.books.is_in_flight("9"));
    }

    #[tokio::test]
    async fn completion_after_detach_is_discarded() {
        let f = signed_in().await;
        loaded_with(&f, json!([foo()])).await;
        let before = f.books.books();
        let gate = f.transport.hold();
        f.transport.push_ok(json!("ok"));

        let (result, _) = tokio::join!(f.books.remove("9"), async {
            tokio::task::yield_now().await;
            f.books.detach();
            gate.notify_one();
        });

        assert_eq!(result, Err(ClientError::Cancelled));
        assert_eq!(f.books.books(), before);
    }

    #[tokio::test]
    async fn detached_collection_refuses_new_work() {
        let f = signed_in().await;
        f.books.detach();
        assert_eq!(f.books.load().await, Err(ClientError::Cancelled));
        assert_eq!(f.transport.request_count(), 0);
        assert!(f.notices.current().is_none());
    }
}
