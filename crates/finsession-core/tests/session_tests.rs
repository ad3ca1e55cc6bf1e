//! Session controller flows end to end: login, restore, logout, bootstrap
//! redirects, validation and the dashboard load.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{
    access_only_store, advance_secs, api_path, controller, controller_with_store, drain, offline_controller, sign_in,
    transaction_json, user, user_json,
};
use finsession_core::auth::{CredentialStore, Session};
use finsession_core::models::ProfileUpdate;
use finsession_core::{
    ApiError, LifecycleState, LogoutReason, NotificationLevel, RegistrationForm, SessionEvent,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path(api_path("/auth/login")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": access,
            "refreshToken": refresh,
            "usuario": user_json("u1", "user"),
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_stores_session_and_starts_countdown() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);
    mount_login(&server, "access-1", "refresh-1").await;

    let before = Utc::now();
    let profile = controller.login("ana@example.com", "secreto").await.unwrap();
    assert_eq!(profile.id, "u1");

    let stored = controller.session().store().load().unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.refresh_token, "refresh-1");
    assert_eq!(stored.user.id, "u1");

    assert_eq!(controller.lifecycle().state(), LifecycleState::Active);
    let expires_at = controller.lifecycle().expires_at().unwrap();
    let window = (expires_at - before).num_seconds();
    assert!((899..=901).contains(&window), "window was {}s", window);

    let events = drain(&mut rx);
    assert!(events.contains(&SessionEvent::StateChanged(LifecycleState::Active)));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Authenticated { user } if user.id == "u1")));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Notification { level: NotificationLevel::Success, message } if message == "Bienvenido, Ana"
    )));
}

#[tokio::test]
async fn test_repeated_logins_leave_one_live_countdown() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    mount_login(&server, "access-1", "refresh-1").await;

    for _ in 0..3 {
        controller.login("ana@example.com", "secreto").await.unwrap();
    }

    let counts = controller.lifecycle().timer_counts();
    assert_eq!(counts.live, 1);
    assert_eq!(counts.cancelled, counts.started - counts.live);
}

#[tokio::test]
async fn test_failed_login_notifies_and_stores_nothing() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);

    Mock::given(method("POST"))
        .and(path(api_path("/auth/login")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Credenciales inválidas"})))
        .mount(&server)
        .await;

    let err = controller.login("ana@example.com", "nope").await.unwrap_err();
    assert!(matches!(err, ApiError::AuthRejected));
    assert!(controller.session().store().is_empty().unwrap());
    assert_eq!(controller.lifecycle().state(), LifecycleState::Unauthenticated);
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::Notification {
            level: NotificationLevel::Error,
            message: "Credenciales inválidas".into(),
        }]
    );
}

#[tokio::test]
async fn test_logout_twice() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);
    sign_in(&controller, "access-1", "refresh-1", "user");

    for _ in 0..2 {
        controller.logout();
        assert!(controller.session().store().is_empty().unwrap());
        assert_eq!(controller.lifecycle().timer_counts().live, 0);
        assert_eq!(controller.lifecycle().state(), LifecycleState::Unauthenticated);
        assert!(controller.current_user().is_none());
    }

    let logouts = drain(&mut rx)
        .into_iter()
        .filter(|e| {
            matches!(e, SessionEvent::LoggedOut { reason: LogoutReason::UserRequested })
        })
        .count();
    assert_eq!(logouts, 2);
}

#[tokio::test]
async fn test_restore_complete_session() {
    let server = MockServer::start().await;
    let store = CredentialStore::in_memory();
    store
        .save(&Session {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            user: user("u1", "admin"),
        })
        .unwrap();
    let (controller, mut rx) = controller_with_store(&server, store);

    assert!(controller.restore().unwrap());
    assert_eq!(controller.lifecycle().state(), LifecycleState::Active);
    assert!(controller.is_admin());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::Authenticated { .. })));
}

#[tokio::test]
async fn test_restore_clears_partial_session() {
    let server = MockServer::start().await;
    let store = CredentialStore::in_memory();
    store.save_tokens("access-1", "refresh-1").unwrap();
    let (controller, _rx) = controller_with_store(&server, store);

    assert!(!controller.restore().unwrap());
    assert!(controller.session().store().is_empty().unwrap());
    assert_eq!(controller.lifecycle().state(), LifecycleState::Unauthenticated);
}

#[tokio::test]
async fn test_no_refresh_token_and_401_logs_out() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller_with_store(&server, access_only_store("old"));
    let store = controller.session().store();
    store.save_user(&user("u1", "user")).unwrap();
    controller.session().set_user(user("u1", "user"));
    controller.lifecycle().start();

    Mock::given(method("GET"))
        .and(path(api_path("/perfil")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("/auth/refresh")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "new"})))
        .expect(0)
        .mount(&server)
        .await;

    let err = controller
        .request(controller.api().profile())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AuthRejected));
    assert!(controller.session().store().is_empty().unwrap());
    assert_eq!(controller.lifecycle().state(), LifecycleState::Unauthenticated);
    assert!(drain(&mut rx).contains(&SessionEvent::LoggedOut {
        reason: LogoutReason::AuthRejected
    }));
}

#[tokio::test]
async fn test_accept_renewal() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);
    sign_in(&controller, "old", "refresh-1", "user");

    Mock::given(method("POST"))
        .and(path(api_path("/auth/refresh")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(controller.accept_renewal().await);
    assert_eq!(
        controller.session().store().access_token().unwrap().as_deref(),
        Some("new")
    );
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        SessionEvent::Notification { level: NotificationLevel::Success, message } if message == "Sesión renovada"
    )));
}

#[tokio::test]
async fn test_failed_renewal_keeps_session() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    sign_in(&controller, "old", "refresh-1", "user");

    Mock::given(method("POST"))
        .and(path(api_path("/auth/refresh")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!controller.accept_renewal().await);
    assert_eq!(controller.lifecycle().state(), LifecycleState::Active);
    assert_eq!(
        controller.session().store().access_token().unwrap().as_deref(),
        Some("old")
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewal_during_warning_still_expires() {
    let (controller, mut rx) = offline_controller();
    sign_in(&controller, "old", "refresh-1", "user");

    advance_secs(845).await;
    assert_eq!(controller.lifecycle().state(), LifecycleState::RenewalWarning);
    drain(&mut rx);

    assert!(!controller.accept_renewal().await);
    assert_eq!(controller.lifecycle().state(), LifecycleState::RenewalWarning);
    assert_eq!(controller.lifecycle().timer_counts().live, 2);
    assert_eq!(
        controller.session().store().access_token().unwrap().as_deref(),
        Some("old")
    );
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::LoggedOut { .. })));

    advance_secs(60).await;
    assert_eq!(controller.lifecycle().state(), LifecycleState::Unauthenticated);
    assert_eq!(controller.lifecycle().timer_counts().live, 0);
    assert!(controller.session().store().is_empty().unwrap());
    assert!(drain(&mut rx).contains(&SessionEvent::LoggedOut {
        reason: LogoutReason::Expired
    }));
}

#[tokio::test]
async fn test_decline_renewal_logs_out() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    sign_in(&controller, "old", "refresh-1", "user");

    controller.decline_renewal();
    assert!(controller.session().store().is_empty().unwrap());
    assert_eq!(controller.lifecycle().timer_counts().live, 0);
}

#[tokio::test]
async fn test_registration_validation_sends_nothing() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);

    let form = RegistrationForm {
        name: "Ana".into(),
        email: "ana@example.com".into(),
        password: "secreto1".into(),
        confirm_password: "secreto2".into(),
    };
    let err = controller.register(&form).await.unwrap_err();
    assert!(err.is_validation());

    let err = controller.load_dashboard(2024, 13).await.unwrap_err();
    assert!(err.is_validation());

    assert!(server.received_requests().await.unwrap().is_empty());
    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(
        e,
        SessionEvent::Notification { level: NotificationLevel::Error, .. }
    )));
}

#[tokio::test]
async fn test_registration_creates_no_session() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);

    Mock::given(method("POST"))
        .and(path(api_path("/auth/register")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "mensaje": "Usuario registrado. Espera la aprobación del administrador",
            "usuario": user_json("u2", "user"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let form = RegistrationForm {
        name: "Ana".into(),
        email: "ana@example.com".into(),
        password: "secreto".into(),
        confirm_password: "secreto".into(),
    };
    let message = controller.register(&form).await.unwrap();
    assert!(message.starts_with("Usuario registrado"));
    assert!(controller.session().store().is_empty().unwrap());
    assert_eq!(controller.lifecycle().state(), LifecycleState::Unauthenticated);
}

#[tokio::test]
async fn test_admin_calls_refused_for_standard_user() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    sign_in(&controller, "access-1", "refresh-1", "user");

    assert!(matches!(
        controller.api().users().await,
        Err(ApiError::AccessDenied(_))
    ));
    assert!(matches!(
        controller.api().approve_user("u2").await,
        Err(ApiError::AccessDenied(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_approves_user() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    sign_in(&controller, "access-1", "refresh-1", "admin");

    Mock::given(method("PATCH"))
        .and(path(api_path("/admin/usuarios/u2/aprobar")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mensaje": "Usuario aprobado"})))
        .expect(1)
        .mount(&server)
        .await;

    let ack = controller.api().approve_user("u2").await.unwrap();
    assert_eq!(ack.message, "Usuario aprobado");
}

#[tokio::test]
async fn test_bootstrap_redirect_establishes_session() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);

    Mock::given(method("GET"))
        .and(path(api_path("/perfil")))
        .and(header("authorization", "Bearer boot-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("u1", "user")))
        .expect(1)
        .mount(&server)
        .await;

    let completed = controller
        .complete_redirect(
            "https://app.example.com/dashboard#access_token=boot-access&refresh_token=boot-refresh",
        )
        .await
        .unwrap();

    assert_eq!(completed.url, "https://app.example.com/dashboard");
    assert_eq!(completed.user.map(|u| u.id).as_deref(), Some("u1"));

    let stored = controller.session().store().load().unwrap().unwrap();
    assert_eq!(stored.access_token, "boot-access");
    assert_eq!(stored.refresh_token, "boot-refresh");
    assert_eq!(controller.lifecycle().state(), LifecycleState::Active);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::Authenticated { .. })));
}

#[tokio::test]
async fn test_bootstrap_error_redirect() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);

    let completed = controller
        .complete_redirect("https://app.example.com/login?error=Cuenta%20pendiente")
        .await
        .unwrap();

    assert_eq!(completed.url, "https://app.example.com/login");
    assert!(completed.user.is_none());
    assert!(controller.session().store().is_empty().unwrap());
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::Notification {
            level: NotificationLevel::Error,
            message: "Cuenta pendiente".into(),
        }]
    );
}

#[tokio::test]
async fn test_dashboard_shares_one_renewal() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    sign_in(&controller, "old", "refresh-1", "user");

    for endpoint in ["/transacciones", "/categorias", "/reportes/estadisticas"] {
        Mock::given(method("GET"))
            .and(path(api_path(endpoint)))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
    }

    let transactions: Vec<_> = (1..=12)
        .map(|day| transaction_json(&format!("t{}", day), day))
        .collect();
    Mock::given(method("GET"))
        .and(path(api_path("/transacciones")))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(transactions)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("/categorias")))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c1", "nombre": "Comida", "tipo": "egreso", "color": "#ff0000"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("/reportes/estadisticas")))
        .and(header("authorization", "Bearer new"))
        .and(query_param("year", "2024"))
        .and(query_param("month", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalIngresos": 500.0,
            "totalEgresos": 120.0,
            "balance": 380.0,
            "porCategoria": {"Comida": 120.0}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("/auth/refresh")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "new"}))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dashboard = controller.load_dashboard(2024, 3).await.unwrap();
    assert_eq!(dashboard.recent_transactions.len(), 10);
    assert_eq!(dashboard.recent_transactions[0].id, "t12");
    assert_eq!(dashboard.recent_transactions[9].id, "t3");
    assert_eq!(dashboard.categories.len(), 1);
    assert_eq!(dashboard.statistics.net(), 380.0);
    assert_eq!((dashboard.year, dashboard.month), (2024, 3));
}

#[tokio::test]
async fn test_update_profile_refreshes_cached_user() {
    let server = MockServer::start().await;
    let (controller, mut rx) = controller(&server);
    sign_in(&controller, "access-1", "refresh-1", "user");

    Mock::given(method("PUT"))
        .and(path(api_path("/perfil")))
        .and(body_json(json!({"nombre": "Ana María"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mensaje": "Perfil actualizado"})))
        .expect(1)
        .mount(&server)
        .await;
    let mut updated = user_json("u1", "user");
    updated["nombre"] = json!("Ana María");
    Mock::given(method("GET"))
        .and(path(api_path("/perfil")))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .expect(1)
        .mount(&server)
        .await;

    let update = ProfileUpdate {
        display_name: Some("Ana María".into()),
        ..Default::default()
    };
    let user = controller.update_profile(&update).await.unwrap();
    assert_eq!(user.display_name, "Ana María");
    assert_eq!(
        controller.current_user().map(|u| u.display_name),
        Some("Ana María".to_string())
    );
    let stored = controller.session().store().load().unwrap().unwrap();
    assert_eq!(stored.user.display_name, "Ana María");
    assert_eq!(stored.access_token, "access-1");
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        SessionEvent::Notification { level: NotificationLevel::Success, message } if message == "Perfil actualizado"
    )));
}

#[tokio::test]
async fn test_empty_profile_update_sends_nothing() {
    let server = MockServer::start().await;
    let (controller, _rx) = controller(&server);
    sign_in(&controller, "access-1", "refresh-1", "user");

    let err = controller
        .update_profile(&ProfileUpdate::default())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(controller.current_user().unwrap().display_name, "Ana");
    assert!(server.received_requests().await.unwrap().is_empty());
}
