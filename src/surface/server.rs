use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use kameo::actor::ActorRef;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::OutputLog;
use crate::actors::{GetSystemHealth, HealthMonitorActor, SupervisorHandle};
use crate::metrics::Metrics;
use crate::process::Role;

// ============================================================================
// Control Surface - HTTP front for the supervisor
// ============================================================================
//
// Endpoints:
//   POST /api/command           raw control frame, forwarded inbound (202)
//   GET  /api/logs              captured lines, ?after=<seq>&role=<role>
//   GET  /api/status            latest supervisor snapshot
//   GET  /api/rewards           active reward weights
//   GET  /api/conn_test         most recent ConnTest echo
//   POST/GET /api/bot_connection   latest report from a game client
//   POST/GET /api/agent_summaries  latest agent summaries from a game client
//   GET  /health                aggregated component health
//   GET  /metrics               prometheus text format
//
// Runs on its own actix system thread; it only talks to the supervisor
// through the handle, never to a process directly.
//
// ============================================================================

pub struct SurfaceState {
    pub supervisor: SupervisorHandle,
    pub log: Arc<OutputLog>,
    pub health: ActorRef<HealthMonitorActor>,
    pub metrics: Arc<Metrics>,
    bot_connection: Mutex<Option<Value>>,
    agent_summaries: Mutex<Option<Value>>,
}

impl SurfaceState {
    pub fn new(
        supervisor: SupervisorHandle,
        log: Arc<OutputLog>,
        health: ActorRef<HealthMonitorActor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            supervisor,
            log,
            health,
            metrics,
            bot_connection: Mutex::new(None),
            agent_summaries: Mutex::new(None),
        }
    }
}

/// Start the control surface HTTP server
/// This should be called in a separate thread/runtime
pub async fn start_surface_server(state: web::Data<SurfaceState>, host: String, port: u16) -> std::io::Result<()> {
    tracing::info!("Starting control surface on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/command", web::post().to(command_handler))
        .route("/api/logs", web::get().to(logs_handler))
        .route("/api/status", web::get().to(status_handler))
        .route("/api/rewards", web::get().to(rewards_handler))
        .route("/api/conn_test", web::get().to(conn_test_handler))
        .route("/api/bot_connection", web::post().to(post_bot_connection))
        .route("/api/bot_connection", web::get().to(get_bot_connection))
        .route("/api/agent_summaries", web::post().to(post_agent_summaries))
        .route("/api/agent_summaries", web::get().to(get_agent_summaries))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn command_handler(state: web::Data<SurfaceState>, frame: web::Json<Value>) -> impl Responder {
    let frame = frame.into_inner();
    let kind = frame.get("kind").and_then(Value::as_str).unwrap_or("<none>").to_string();

    match state.supervisor.send_frame(frame) {
        Ok(()) => {
            tracing::debug!(kind = %kind, "Forwarded command");
            HttpResponse::Accepted().json(serde_json::json!({ "accepted": true, "kind": kind }))
        }
        Err(e) => {
            tracing::error!(kind = %kind, error = %e, "Supervisor is not accepting commands");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "accepted": false,
                "error": e.to_string()
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    after: u64,
    role: Option<Role>,
}

async fn logs_handler(state: web::Data<SurfaceState>, query: web::Query<LogQuery>) -> impl Responder {
    let page = state.log.entries_after(query.after, query.role).await;
    HttpResponse::Ok().json(page)
}

async fn status_handler(state: web::Data<SurfaceState>) -> impl Responder {
    HttpResponse::Ok().json(state.supervisor.status())
}

async fn rewards_handler(state: web::Data<SurfaceState>) -> impl Responder {
    HttpResponse::Ok().json(state.supervisor.status().rewards)
}

async fn conn_test_handler(state: web::Data<SurfaceState>) -> impl Responder {
    match state.log.last_conn_test().await {
        Some(reply) => HttpResponse::Ok().json(reply),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn post_bot_connection(state: web::Data<SurfaceState>, report: web::Json<Value>) -> impl Responder {
    *state.bot_connection.lock().await = Some(report.into_inner());
    HttpResponse::NoContent().finish()
}

async fn get_bot_connection(state: web::Data<SurfaceState>) -> impl Responder {
    latest_report(&state.bot_connection).await
}

async fn post_agent_summaries(state: web::Data<SurfaceState>, report: web::Json<Value>) -> impl Responder {
    *state.agent_summaries.lock().await = Some(report.into_inner());
    HttpResponse::NoContent().finish()
}

async fn get_agent_summaries(state: web::Data<SurfaceState>) -> impl Responder {
    latest_report(&state.agent_summaries).await
}

async fn latest_report(slot: &Mutex<Option<Value>>) -> HttpResponse {
    match slot.lock().await.clone() {
        Some(report) => HttpResponse::Ok().json(report),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn health_handler(state: web::Data<SurfaceState>) -> impl Responder {
    if !state.supervisor.is_running() {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "reason": "supervisor stopped"
        }));
    }

    match state.health.ask(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => HttpResponse::ServiceUnavailable().json(health),
        Ok(health) => HttpResponse::Ok().json(health),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "reason": "health monitor unavailable"
        })),
    }
}

async fn metrics_handler(state: web::Data<SurfaceState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{Supervisor, SupervisorConfig};
    use crate::control::duplex;
    use crate::process::{EntryPoint, ProcessTimeouts};
    use crate::rewards::{RewardConfig, RewardStore};
    use crate::surface::spawn_bridge;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use std::time::Duration;
    use tempfile::TempDir;

    fn surface_state(dir: &TempDir) -> web::Data<SurfaceState> {
        let (supervisor_end, surface_end) = duplex();
        let metrics = Arc::new(Metrics::new().unwrap());
        let health = HealthMonitorActor::spawn_default();

        let config = SupervisorConfig {
            run_name: "surface-test".to_string(),
            trainer: EntryPoint::new("sh").args(["-c", "exec sleep 30"]),
            simulator: EntryPoint::new("sh").args(["-c", "exec sleep 30"]),
            settle_delay: Duration::from_millis(10),
            health_interval: Duration::from_millis(50),
            timeouts: ProcessTimeouts::default(),
        };
        let supervisor = Supervisor::new(
            config,
            supervisor_end,
            RewardStore::new(dir.path().join("rewards.json")),
            RewardConfig::default(),
            metrics.clone(),
            health.clone(),
        );

        let (commands, outbound) = surface_end.into_split();
        let handle = supervisor.handle(commands);
        supervisor.spawn();

        let log = Arc::new(OutputLog::new(100));
        spawn_bridge(outbound, log.clone());

        web::Data::new(SurfaceState::new(handle, log, health, metrics))
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition never became true");
    }

    #[actix_web::test]
    async fn test_command_round_trip_through_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let state = surface_state(&dir);
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/command")
            .set_json(serde_json::json!({ "kind": "ConnTest", "value": 5 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let log = state.log.clone();
        eventually(|| {
            let log = log.clone();
            async move { log.last_conn_test().await.is_some() }
        })
        .await;

        let req = test::TestRequest::get().uri("/api/conn_test").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["value"], 5);
    }

    #[actix_web::test]
    async fn test_reward_change_visible_on_rewards_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = surface_state(&dir);
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/command")
            .set_json(serde_json::json!({
                "kind": "RewardChange",
                "rewards": ["KickoffReward"],
                "weights": [2.0]
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

        let handle = state.supervisor.clone();
        eventually(|| {
            let handle = handle.clone();
            async move { handle.status().rewards.len() == 1 }
        })
        .await;

        let req = test::TestRequest::get().uri("/api/rewards").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({ "KickoffReward": 2.0 }));
    }

    #[actix_web::test]
    async fn test_logs_endpoint_filters_by_role() {
        let dir = tempfile::tempdir().unwrap();
        let state = surface_state(&dir);
        state.log.push(Role::Trainer, "loss 0.4").await;
        state.log.push(Role::Simulator, "episode 1").await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/logs?after=0&role=simulator").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["latest"], 2);
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
        assert_eq!(body["entries"][0]["text"], "episode 1");
        assert_eq!(body["entries"][0]["role"], "simulator");
    }

    #[actix_web::test]
    async fn test_client_reports_are_stored_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let state = surface_state(&dir);
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/agent_summaries").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let report = serde_json::json!({ "agents": [{ "name": "astra", "goals": 3 }] });
        let req = test::TestRequest::post()
            .uri("/api/agent_summaries")
            .set_json(report.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri("/api/agent_summaries").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, report);

        let req = test::TestRequest::get().uri("/api/bot_connection").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn test_status_health_and_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let state = surface_state(&dir);
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["trainer"]["state"], "Stopped");
        assert_eq!(body["simulator"]["role"], "simulator");

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        state.metrics.record_control_message("Start");
        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("astra_control_messages_total"));
    }

    #[actix_web::test]
    async fn test_health_reports_stopped_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let state = surface_state(&dir);
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;
        assert!(state.supervisor.is_running());

        state.supervisor.shutdown();
        let handle = state.supervisor.clone();
        eventually(|| {
            let handle = handle.clone();
            async move { !handle.is_running() }
        })
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = test::TestRequest::post()
            .uri("/api/command")
            .set_json(serde_json::json!({ "kind": "Start" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
