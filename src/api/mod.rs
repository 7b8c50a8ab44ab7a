pub mod extract;
pub mod format;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::config;
use crate::dao::{AccountDao, StudyConsentDao, StudyDao, SubpopulationDao, TemplateDao, UploadSchemaDao};
use crate::database::{MemoryStore, PgStore};
use crate::handlers::{elevated, protected, public};
use crate::middleware::{session_middleware, validate_study_middleware};
use crate::services::{
    AccountNotifier, AccountService, StudyConsentService, StudyService, SubpopulationService, TemplateService,
    TracingNotifier, UploadSchemaService,
};

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub studies: Arc<StudyService>,
    pub accounts: Arc<AccountService>,
    pub templates: Arc<TemplateService>,
    pub schemas: Arc<UploadSchemaService>,
    pub consents: Arc<StudyConsentService>,
    pub subpopulations: Arc<SubpopulationService>,
    /// Present when running against PostgreSQL; used by the health check
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn with_store<S>(store: Arc<S>, notifier: Arc<dyn AccountNotifier>, pool: Option<PgPool>) -> Self
    where
        S: AccountDao + TemplateDao + UploadSchemaDao + StudyConsentDao + SubpopulationDao + StudyDao + 'static,
    {
        let subpopulations = Arc::new(SubpopulationService::new(store.clone(), store.clone()));
        Self {
            studies: Arc::new(StudyService::new(store.clone(), subpopulations.clone())),
            accounts: Arc::new(AccountService::new(store.clone(), notifier)),
            templates: Arc::new(TemplateService::new(store.clone())),
            schemas: Arc::new(UploadSchemaService::new(store.clone())),
            consents: Arc::new(StudyConsentService::new(store)),
            subpopulations,
            pool,
        }
    }

    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), Arc::new(TracingNotifier), None)
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::with_store(Arc::new(PgStore::new(pool.clone())), Arc::new(TracingNotifier), Some(pool))
    }
}

/// The complete router: public routes, then everything behind a session
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(upload_schema_routes())
        .merge(subpopulation_routes())
        .merge(consent_routes())
        .merge(template_routes())
        .merge(participant_routes())
        .merge(elevated_routes())
        // Layers run bottom-up: the session is resolved before the study is checked
        .layer(middleware::from_fn_with_state(state.clone(), validate_study_middleware))
        .layer(middleware::from_fn(session_middleware));

    let router = Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(protected)
        .layer(cors_layer());
    let router = if config().api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };
    router.with_state(state)
}

fn cors_layer() -> CorsLayer {
    let security = &config().security;
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

fn upload_schema_routes() -> Router<AppState> {
    use protected::upload_schemas as schemas;

    Router::new()
        .route("/v4/uploadschemas", post(schemas::create_schema_revision_v4))
        .route(
            "/v3/uploadschemas",
            get(schemas::get_upload_schemas_for_study).post(schemas::create_or_update_upload_schema),
        )
        .route(
            "/v3/uploadschemas/:schema_id",
            get(schemas::get_upload_schema_all_revisions).delete(schemas::delete_all_revisions_of_upload_schema),
        )
        .route("/v3/uploadschemas/:schema_id/recent", get(schemas::get_upload_schema))
        .route(
            "/v3/uploadschemas/:schema_id/revisions/:revision",
            get(schemas::get_upload_schema_by_id_and_rev).delete(schemas::delete_schema_revision),
        )
        .route(
            "/v4/uploadschemas/:schema_id/revisions/:revision",
            post(schemas::update_schema_revision_v4),
        )
}

fn subpopulation_routes() -> Router<AppState> {
    use protected::subpopulations;

    Router::new()
        .route(
            "/v3/subpopulations",
            get(subpopulations::get_all_subpopulations).post(subpopulations::create_subpopulation),
        )
        .route(
            "/v3/subpopulations/:guid",
            get(subpopulations::get_subpopulation)
                .post(subpopulations::update_subpopulation)
                .delete(subpopulations::delete_subpopulation),
        )
}

fn consent_routes() -> Router<AppState> {
    use protected::study_consents as consents;

    Router::new()
        .route(
            "/v3/subpopulations/:guid/consents",
            get(consents::get_all_consents_v2).post(consents::add_consent_v2),
        )
        .route("/v3/subpopulations/:guid/consents/published", get(consents::get_active_consent_v2))
        .route("/v3/subpopulations/:guid/consents/recent", get(consents::get_most_recent_consent_v2))
        .route("/v3/subpopulations/:guid/consents/:created_on", get(consents::get_consent_v2))
        .route(
            "/v3/subpopulations/:guid/consents/:created_on/publish",
            post(consents::publish_consent_v2),
        )
        // Deprecated study-level paths, served from the default subpopulation
        .route("/v3/consents", get(consents::get_all_consents).post(consents::add_consent))
        .route("/v3/consents/published", get(consents::get_active_consent))
        .route("/v3/consents/recent", get(consents::get_most_recent_consent))
        .route("/v3/consents/:created_on", get(consents::get_consent))
        .route("/v3/consents/:created_on/publish", post(consents::publish_consent))
}

fn template_routes() -> Router<AppState> {
    use protected::templates;

    Router::new()
        .route("/v3/templates", get(templates::get_templates).post(templates::create_template))
        .route(
            "/v3/templates/:guid",
            get(templates::get_template)
                .post(templates::update_template)
                .delete(templates::delete_template),
        )
}

fn participant_routes() -> Router<AppState> {
    use protected::participants;

    Router::new()
        .route(
            "/v3/participants",
            get(participants::get_participants).post(participants::create_participant),
        )
        .route(
            "/v3/participants/:user_id",
            get(participants::get_participant)
                .post(participants::update_participant)
                .delete(participants::delete_participant),
        )
}

fn elevated_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v3/studies/:study_id/uploadschemas/:schema_id/revisions/:revision",
            get(elevated::get_upload_schema_by_study_and_schema_and_rev),
        )
        .route("/v3/synapse/:synapse_user_id/studies", get(elevated::get_study_ids_for_synapse_user))
}
