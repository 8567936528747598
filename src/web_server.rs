use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation::{AnnotationNote, ConversationTurn, Role, StyleSample};
use crate::dataset::Corpus;
use crate::defender::{Defender, DefenderReport};
use crate::error::SimulationError;
use crate::orchestrator::{Orchestrator, Session, SessionSnapshot};

/// Events pushed to every connected WebSocket client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    TurnAppended {
        session_id: Uuid,
        turn: ConversationTurn,
    },
    Annotated {
        session_id: Uuid,
        note: AnnotationNote,
    },
    SessionClosed {
        session_id: Uuid,
    },
}

/// Errors returned by API handlers, rendered as `{error, kind, retryable}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("no session with id {0}")]
    SessionNotFound(Uuid),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, retryable) = match &self {
            ApiError::Simulation(e) => {
                let status = match e {
                    SimulationError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
                    SimulationError::GenerationFailure(_) => StatusCode::BAD_GATEWAY,
                    SimulationError::SessionClosed => StatusCode::CONFLICT,
                };
                (status, e.kind(), e.is_retryable())
            }
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
        };
        if status.is_server_error() {
            error!(error = %self, "API request failed");
        }
        (
            status,
            Json(json!({ "error": self.to_string(), "kind": kind, "retryable": retryable })),
        )
            .into_response()
    }
}

type SessionMap = HashMap<Uuid, Arc<Mutex<Session>>>;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    orchestrator: Arc<Orchestrator>,
    defender: Arc<Defender>,
    corpus: Arc<Corpus>,
    // Each session sits behind its own lock so turns are strictly sequential.
    sessions: Arc<RwLock<SessionMap>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        defender: Arc<Defender>,
        corpus: Arc<Corpus>,
        templates_dir: impl Into<PathBuf>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel::<SessionEvent>(100);
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.into())),
            broadcast_tx,
            orchestrator,
            defender,
            corpus,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Receiver for the event feed; used by the WebSocket handler and tests.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        if self.broadcast_tx.send(event).is_err() {
            debug!("No WebSocket subscribers for session event");
        }
    }

    /// Number of sessions currently held in memory.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, ApiError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ApiError::SessionNotFound(id))
    }
}

fn create_minijinja_env(dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "Catphishing Awareness Demo (SIMULATION)",
                    provider => state.orchestrator.client_name(),
                    context_window => state.orchestrator.config().context_window,
                    corpus_examples => state.corpus.examples().len(),
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub starting_role: Option<String>,
    #[serde(default)]
    pub style_sample: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let role = match request.starting_role.as_deref() {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Attacker,
    };
    let style = match request.style_sample {
        Some(text) if !text.trim().is_empty() => StyleSample::new(text),
        _ => state.corpus.sample_style_text(&mut thread_rng()),
    };

    let session = state.orchestrator.start_session(role, style);
    let snapshot = session.snapshot();
    state
        .sessions
        .write()
        .await
        .insert(session.id(), Arc::new(Mutex::new(session)));
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id).await?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub turn: ConversationTurn,
    pub annotation: Option<AnnotationNote>,
}

async fn advance_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TurnResponse>, ApiError> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;
    let (turn, annotation) = state.orchestrator.step(&mut session).await?;

    state.publish(SessionEvent::TurnAppended {
        session_id: id,
        turn: turn.clone(),
    });
    if let Some(note) = &annotation {
        state.publish(SessionEvent::Annotated {
            session_id: id,
            note: note.clone(),
        });
    }
    Ok(Json(TurnResponse { turn, annotation }))
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub user_turn: ConversationTurn,
    pub had_sensitive: bool,
    pub reply: ConversationTurn,
    pub annotation: Option<AnnotationNote>,
}

// The user speaks as the victim, then the model answers as the attacker. If the
// reply fails the user turn stays; POST .../turns retries the reply.
async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;

    let (user_turn, had_sensitive) = state.orchestrator.submit_turn(&mut session, &request.text)?;
    state.publish(SessionEvent::TurnAppended {
        session_id: id,
        turn: user_turn.clone(),
    });

    let (reply, annotation) = state.orchestrator.step(&mut session).await?;
    state.publish(SessionEvent::TurnAppended {
        session_id: id,
        turn: reply.clone(),
    });
    if let Some(note) = &annotation {
        state.publish(SessionEvent::Annotated {
            session_id: id,
            note: note.clone(),
        });
    }
    Ok(Json(MessageResponse {
        user_turn,
        had_sensitive,
        reply,
        annotation,
    }))
}

// Closing hands back the final snapshot and drops the session from memory.
async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(id).await?;
    let (was_active, snapshot) = {
        let mut session = session.lock().await;
        let was_active = !session.is_closed();
        (was_active, state.orchestrator.end_session(&mut session))
    };
    state.sessions.write().await.remove(&id);

    if was_active {
        state.publish(SessionEvent::SessionClosed { session_id: id });
    }
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct DefendRequest {
    pub message: String,
}

async fn defend(
    State(state): State<AppState>,
    Json(request): Json<DefendRequest>,
) -> Result<Json<DefenderReport>, ApiError> {
    let report = state.defender.analyze(&request.message).await?;
    Ok(Json(report))
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Forward session events to one client until either side goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut events = state.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome = json!({"type": "Info", "payload": {"message": "Connected to session feed"}});
    if sender.send(Message::Text(welcome.to_string())).await.is_err() {
        warn!("Failed to send welcome message to new WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json_msg) = serde_json::to_string(&event) else {
                            error!("Failed to serialize session event");
                            continue;
                        };
                        if sender.send(Message::Text(json_msg)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed WebSocket");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring text message from client: {}", text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }
    info!("WebSocket connection closed");
}

/// Router with all pages, API routes and the event feed.
pub fn build_router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    let static_dir: PathBuf = static_dir.into();
    let static_files_service = ServeDir::new(static_dir).not_found_service(
        tower::service_fn(|_req: Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/turns", post(advance_session))
        .route("/api/sessions/:id/messages", post(post_message))
        .route("/api/sessions/:id/end", post(end_session))
        .route("/api/defend", post(defend))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, state: AppState) -> Result<()> {
    let app = build_router(state, "static");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
