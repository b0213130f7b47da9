//! Page store rendered on the server for a single request.
//!
//! The request handler builds a fresh store for the requested path, starts
//! the root saga, which loads the page for the current route, then closes the
//! store and waits for the load to settle before rendering. The final state
//! is embedded in the HTML so the browser store can start from it.

use isostate_core::{
    BoxReducer, History, LocationChange, Navigation, Reducer, ReducerError, RoutedAction,
    RouterState,
};
use isostate_runtime::{HostEnvironment, Saga, SagaContext, SagaError, StoreFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Content of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Document title
    pub title: String,
    /// Main content
    pub body: String,
}

/// State of the page store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    /// Current location
    pub router: RouterState,
    /// Loaded page, if any
    pub page: Option<Page>,
    /// Whether a load is in flight
    pub loading: bool,
    /// Last load failure
    pub error: Option<String>,
}

/// Actions of the page store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    /// Request a navigation
    Navigate(Navigation),
    /// The history moved
    LocationChanged(LocationChange),
    /// Start loading the page at `path`
    Load(String),
    /// A page finished loading
    Loaded(Page),
    /// A page could not be loaded
    LoadFailed(String),
}

impl RoutedAction for PageAction {
    fn navigation(&self) -> Option<&Navigation> {
        match self {
            Self::Navigate(navigation) => Some(navigation),
            _ => None,
        }
    }

    fn location_changed(change: LocationChange) -> Self {
        Self::LocationChanged(change)
    }
}

/// Reducer for [`PageState`]
pub struct PageReducer {
    history: Arc<dyn History>,
}

impl Reducer for PageReducer {
    type State = PageState;
    type Action = PageAction;

    fn init(&self, state: &mut PageState) -> Result<(), ReducerError> {
        state.router = RouterState::from_history(self.history.as_ref());
        Ok(())
    }

    fn reduce(&self, state: &mut PageState, action: PageAction) {
        match action {
            PageAction::Navigate(_) => {},
            PageAction::LocationChanged(change) => state.router.apply(change),
            PageAction::Load(_) => {
                state.loading = true;
                state.error = None;
            },
            PageAction::Loaded(page) => {
                state.loading = false;
                state.page = Some(page);
            },
            PageAction::LoadFailed(error) => {
                state.loading = false;
                state.page = None;
                state.error = Some(error);
            },
        }
    }
}

/// Reducer factory handed to the store factory
///
/// # Errors
///
/// Never fails; the signature matches [`isostate_core::ReducerFactory`].
pub fn create_reducer(
    history: &Arc<dyn History>,
) -> Result<BoxReducer<PageState, PageAction>, ReducerError> {
    Ok(Box::new(PageReducer {
        history: Arc::clone(history),
    }))
}

/// Look up the content for `path`.
///
/// # Errors
///
/// Returns [`SagaError::Failed`] for unknown paths.
pub async fn fetch_page(path: &str) -> Result<Page, SagaError> {
    // stands in for a content service round trip
    tokio::time::sleep(Duration::from_millis(5)).await;

    let (title, body) = match path {
        "/" => ("Home", "Welcome home."),
        "/about" => ("About", "Rendered on the server, hydrated in the browser."),
        other => return Err(SagaError::Failed(format!("no page at {other}"))),
    };
    Ok(Page {
        title: title.to_string(),
        body: body.to_string(),
    })
}

async fn load_page(
    ctx: SagaContext<PageState, PageAction>,
    path: String,
) -> Result<(), SagaError> {
    let outcome = match fetch_page(&path).await {
        Ok(page) => PageAction::Loaded(page),
        Err(error) => PageAction::LoadFailed(error.to_string()),
    };
    ctx.put(outcome)
}

/// Loads the current route, then every page requested later
#[must_use]
pub fn root_saga() -> Saga<PageState, PageAction> {
    Saga::new("pages", |ctx: SagaContext<PageState, PageAction>| async move {
        let path = ctx.select(|s| s.router.location.pathname.clone())?;
        ctx.fork("initial_load", move |ctx| load_page(ctx, path));

        ctx.take_every(
            |action| matches!(action, PageAction::Load(_)),
            |ctx, action| async move {
                match action {
                    PageAction::Load(path) => load_page(ctx, path).await,
                    _ => Ok(()),
                }
            },
        );
        Ok(())
    })
}

/// Render the document with the state embedded for hydration.
///
/// # Errors
///
/// Returns an error if the state cannot be serialized.
pub fn render(state: &PageState) -> Result<String, serde_json::Error> {
    // keep `</script>` inside the payload from closing the tag
    let preloaded = serde_json::to_string(state)?.replace('<', "\\u003c");
    let (title, body) = match (&state.page, &state.error) {
        (Some(page), _) => (page.title.as_str(), page.body.as_str()),
        (None, Some(error)) => ("Not found", error.as_str()),
        (None, None) => ("Loading", ""),
    };

    Ok(format!(
        "<!doctype html>\n<html>\n<head><title>{title}</title></head>\n<body>\n\
         <main>{body}</main>\n\
         <script>window.__PRELOADED_STATE__ = {preloaded}</script>\n\
         </body>\n</html>\n"
    ))
}

/// Store factory for a server process
#[must_use]
pub fn server_factory(
    host: HostEnvironment<PageState, PageAction>,
) -> StoreFactory<PageState, PageAction> {
    StoreFactory::new(create_reducer, root_saga(), host)
}

/// Render one request.
///
/// # Errors
///
/// Fails if the store cannot be built, the saga cannot start, loading does
/// not settle within `timeout`, or the state cannot be serialized.
pub async fn handle_request(
    factory: &StoreFactory<PageState, PageAction>,
    path: &str,
    timeout: Duration,
) -> anyhow::Result<String> {
    let store = factory.configure_store(PageState::default(), path)?.store;

    let root = store.run_saga(factory.root_saga())?;
    store.settle(&root, timeout).await?;

    let html = store.state(render)?;
    tracing::info!(path, bytes = html.len(), "Rendered request");
    Ok(html)
}
