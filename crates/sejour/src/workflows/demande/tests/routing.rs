use super::common::*;
use crate::workflows::demande::domain::{DemandeId, StatutDemande};
use crate::workflows::demande::identity::HeaderIdentityProvider;
use crate::workflows::demande::repository::DemandeRepository;
use crate::workflows::demande::router::{demande_router, ALERT_HEADER, PARAMS_HEADER};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

fn build_router() -> (Router, Arc<MemoryDemandes>) {
    let (service, demandes, _) = build_service();
    let router = demande_router(Arc::new(service), Arc::new(HeaderIdentityProvider::default()));
    (router, demandes)
}

fn request(method: &str, uri: &str, login: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(login) = login {
        builder = builder.header("x-user-login", login);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

fn only_demande(demandes: &MemoryDemandes) -> crate::workflows::demande::domain::Demande {
    let records = demandes.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    records.values().next().cloned().expect("one demande")
}

#[tokio::test]
async fn init_then_list_returns_the_callers_draft() {
    let (router, demandes) = build_router();

    let response = router
        .clone()
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("init response");
    assert_eq!(response.status(), StatusCode::OK);
    let draft = only_demande(&demandes);

    let response = router
        .oneshot(request("GET", "/api/demandes", Some(OWNER), None))
        .await
        .expect("list response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let listed = payload.as_array().expect("array payload");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], draft.id.0.as_str());
    assert_eq!(listed[0]["statut"], "draft");
}

#[tokio::test]
async fn second_init_conflicts() {
    let (router, _) = build_router();
    router
        .clone()
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("first init");

    let response = router
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("second init");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn requests_without_caller_are_unauthorized() {
    let (router, demandes) = build_router();

    let response = router
        .oneshot(request("PUT", "/api/demande/init", None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert!(payload["error"].as_str().is_some());
    assert!(demandes.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn update_returns_the_saved_demande_with_alert_headers() {
    let (router, demandes) = build_router();
    router
        .clone()
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("init");
    let draft = only_demande(&demandes);
    let body = serde_json::to_value(filled_in(&draft)).expect("dto json");

    let response = router
        .oneshot(request("PUT", "/api/demande/update", Some(OWNER), Some(body)))
        .await
        .expect("update response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(ALERT_HEADER).and_then(|value| value.to_str().ok()),
        Some("sejour.demande.updated")
    );
    assert_eq!(
        response.headers().get(PARAMS_HEADER).and_then(|value| value.to_str().ok()),
        Some(draft.id.0.as_str())
    );
    let payload = read_json_body(response).await;
    assert_eq!(payload["identity"]["firstName"], "Kim");
    assert_eq!(payload["statut"], "draft");
}

#[tokio::test]
async fn update_without_id_is_a_bad_request() {
    let (router, demandes) = build_router();
    router
        .clone()
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("init");
    let mut dto = filled_in(&only_demande(&demandes));
    dto.id = None;

    let response = router
        .oneshot(request(
            "PUT",
            "/api/demande/update",
            Some(OWNER),
            Some(serde_json::to_value(dto).expect("dto json")),
        ))
        .await
        .expect("update response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validate_by_another_account_is_a_server_error() {
    let (router, demandes) = build_router();
    router
        .clone()
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("init");
    let draft = only_demande(&demandes);
    let body = serde_json::to_value(filled_in(&draft)).expect("dto json");

    let response = router
        .oneshot(request("PUT", "/api/demande/validate", Some("b@y.com"), Some(body)))
        .await
        .expect("validate response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(only_demande(&demandes), draft);
}

#[tokio::test]
async fn prepaid_without_pending_payment_conflicts() {
    let (router, _) = build_router();

    let response = router
        .oneshot(request("PUT", "/api/demande/prepaid", Some(OWNER), None))
        .await
        .expect("prepaid response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_demande_id_is_not_found() {
    let (router, _) = build_router();

    let response = router
        .oneshot(request("GET", "/api/demande/dem-missing", None, None))
        .await
        .expect("get response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_queries_and_counts_reflect_the_store() {
    let (router, demandes) = build_router();
    router
        .clone()
        .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
        .await
        .expect("init");
    let mut paid = only_demande(&demandes);
    paid.id = DemandeId("dem-paid".to_string());
    paid.email = "b@y.com".to_string();
    paid.statut = StatutDemande::Recevability;
    demandes.save(paid).expect("seed paid demande");

    let response = router
        .clone()
        .oneshot(request("GET", "/api/demande/statut?statut=recevability", None, None))
        .await
        .expect("statut response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let listed = payload.as_array().expect("array payload");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], "dem-paid");

    let response = router
        .clone()
        .oneshot(request(
            "GET",
            "/api/demande?email=b@y.com&statut=recevability",
            None,
            None,
        ))
        .await
        .expect("lookup response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["email"], "b@y.com");

    let response = router
        .clone()
        .oneshot(request("GET", "/api/demande?email=b@y.com&statut=payment", None, None))
        .await
        .expect("lookup response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(request("GET", "/api/demande/count", None, None))
        .await
        .expect("count response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["nbPaid"], 1);
    assert_eq!(payload["nbScheduled"], 0);
    assert_eq!(payload["nbIdentityVerified"], 0);
}

#[tokio::test]
async fn agent_drives_back_office_steps_over_http() {
    let (router, demandes) = build_router();
    let mut paid = {
        router
            .clone()
            .oneshot(request("PUT", "/api/demande/init", Some(OWNER), None))
            .await
            .expect("init");
        only_demande(&demandes)
    };
    paid.statut = StatutDemande::Recevability;
    demandes.save(paid.clone()).expect("mark paid");

    let agent_request = |uri: &str| {
        let mut request = request(
            "PUT",
            uri,
            Some("agent@prefecture.fr"),
            Some(serde_json::json!({ "id": paid.id.0 })),
        );
        request
            .headers_mut()
            .insert("x-user-authorities", "ROLE_AGENT".parse().expect("header value"));
        request
    };

    for (uri, expected) in [
        ("/api/demande/verify", StatutDemande::Rdv),
        ("/api/demande/rdv", StatutDemande::Identification),
        ("/api/demande/identification", StatutDemande::Decision),
        ("/api/demande/finalDecision", StatutDemande::Archive),
    ] {
        let response = router
            .clone()
            .oneshot(agent_request(uri))
            .await
            .expect("transition response");
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(only_demande(&demandes).statut, expected, "{uri}");
    }
}
