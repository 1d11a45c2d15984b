//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::auth::TokenService;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::Role;
use domain::services::{InMemoryImageStorage, InMemoryMailer};
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;
use serde_json::{Value, json};
use store::{InMemoryStore, NewUser, User, UserStore};
use tower::ServiceExt;

const TOKEN_SECRET: &str = "integration-secret-integration-secret";
const WEBHOOK_SECRET: &str = "webhook-secret";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    state: Arc<AppState<InMemoryStore>>,
    store: InMemoryStore,
    mailer: InMemoryMailer,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let mailer = InMemoryMailer::new();
        let state = Arc::new(AppState::new(
            store.clone(),
            Arc::new(mailer.clone()),
            Arc::new(InMemoryImageStorage::new()),
            TokenService::new(TOKEN_SECRET, chrono::Duration::minutes(30)),
            Some(SecretString::from(WEBHOOK_SECRET)),
        ));
        let app = api::create_app(state.clone(), get_metrics_handle());
        Self {
            app,
            state,
            store,
            mailer,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.call(request).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn user(&self, email: &str, role: Role) -> (User, String) {
        let user = self
            .store
            .insert_user(NewUser {
                email: email.to_string(),
                password_hash: domain::hash_password("password123").unwrap(),
                name: email.split('@').next().unwrap().to_string(),
                phone: None,
                role,
            })
            .await
            .unwrap();
        let token = self.state.tokens.issue(&user).unwrap();
        (user, token)
    }

    /// Creates a product and model priced 5000 retail / 4000 reseller with
    /// the given stock per size. Returns the model id.
    async fn seed_model(&self, admin: &str, sizes: &[(i32, i32)]) -> String {
        let (status, product) = self
            .send(
                "POST",
                "/api/v1/products",
                Some(admin),
                Some(json!({ "name": "Runner" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, model) = self
            .send(
                "POST",
                "/api/v1/models",
                Some(admin),
                Some(json!({
                    "product_id": product["data"]["id"],
                    "name": "Runner Low",
                    "color": "Black",
                    "prices": {
                        "cost": 2000,
                        "retail": 5000,
                        "reseller": 4000,
                        "allied": 3500,
                        "promotional": 3000
                    }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{model}");
        let model_id = model["data"]["id"].as_str().unwrap().to_string();

        for (size, quantity) in sizes {
            let (status, _) = self
                .send(
                    "POST",
                    "/api/v1/stocks",
                    Some(admin),
                    Some(json!({ "model_id": model_id, "size": size, "quantity": quantity })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        model_id
    }

    async fn stock_of(&self, model_id: &str, size: i64) -> i64 {
        let (_, stocks) = self.send("GET", "/api/v1/stocks", None, None).await;
        stocks["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["model_id"] == model_id && s["size"] == size)
            .map(|s| s["quantity"].as_i64().unwrap())
            .unwrap()
    }
}

fn normal_order(model_id: &str, size: i32, quantity: i32) -> Value {
    json!({
        "kind": "normal",
        "lines": [{ "model_id": model_id, "size": size, "quantity": quantity }]
    })
}

// -- Health, metrics and fallback --

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new();
    let (status, json) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let t = TestApp::new();
    let (status, json) = t.send("GET", "/api/v1/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["status"], 404);
}

// -- Users --

#[tokio::test]
async fn test_signup_and_signin() {
    let t = TestApp::new();
    let (status, json) = t
        .send(
            "POST",
            "/api/v1/users/signup",
            None,
            Some(json!({
                "email": "Ana@Example.com",
                "password": "password123",
                "name": "Ana"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["email"], "ana@example.com");
    assert!(json["data"].get("password_hash").is_none());
    assert!(json["meta"]["token"].as_str().is_some());
    assert_eq!(t.mailer.sent().await.len(), 1);

    let (status, json) = t
        .send(
            "POST",
            "/api/v1/users/signin",
            None,
            Some(json!({ "email": "ana@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = json["meta"]["token"].as_str().unwrap();
    let claims = t.state.tokens.validate(token).unwrap();
    assert_eq!(claims.role, Role::Retail);

    let (status, json) = t
        .send(
            "POST",
            "/api/v1/users/signin",
            None,
            Some(json!({ "email": "ana@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["status"], 401);
}

#[tokio::test]
async fn test_signup_validation() {
    let t = TestApp::new();
    let (status, _) = t
        .send(
            "POST",
            "/api/v1/users/signup",
            None,
            Some(json!({
                "email": "boss@example.com",
                "password": "password123",
                "name": "Boss",
                "role": "admin"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = t
        .send(
            "POST",
            "/api/v1/users/signup",
            None,
            Some(json!({
                "email": "shop@example.com",
                "password": "password123",
                "name": "Shop",
                "role": "reseller"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

    let (status, json) = t
        .send("POST", "/api/v1/users/signup", None, Some(json!({ "email": 3 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["status"], 400);
}

#[tokio::test]
async fn test_user_access_rules() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (ana, ana_token) = t.user("ana@example.com", Role::Retail).await;
    let (bob, _) = t.user("bob@example.com", Role::Retail).await;

    let (status, _) = t.send("GET", "/api/v1/users", Some(&ana_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = t.send("GET", "/api/v1/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let own = format!("/api/v1/users/{}", ana.id);
    let (status, _) = t.send("GET", &own, Some(&ana_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let other = format!("/api/v1/users/{}", bob.id);
    let (status, _) = t.send("GET", &other, Some(&ana_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .send("PUT", &own, Some(&ana_token), Some(json!({ "role": "reseller" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = t
        .send("PUT", &own, Some(&admin), Some(json!({ "role": "reseller" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["role"], "reseller");
}

#[tokio::test]
async fn test_bad_tokens_are_rejected() {
    let t = TestApp::new();
    let (status, _) = t.send("GET", "/api/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t
        .send("GET", "/api/v1/orders", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Catalog --

#[tokio::test]
async fn test_catalog_writes_require_admin() {
    let t = TestApp::new();
    let (_, retail) = t.user("ana@example.com", Role::Retail).await;
    let body = json!({ "name": "Runner" });

    let (status, _) = t
        .send("POST", "/api/v1/products", None, Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t
        .send("POST", "/api/v1/products", Some(&retail), Some(body))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = t.send("GET", "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stock_adjustment_and_total() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let model_id = t.seed_model(&admin, &[(38, 4), (39, 6)]).await;

    let (_, json) = t.send("GET", "/api/v1/stocks/total", None, None).await;
    assert_eq!(json["data"]["total"], 10);

    let (_, stocks) = t.send("GET", "/api/v1/stocks", None, None).await;
    let stock_id = stocks["data"][0]["id"].as_str().unwrap().to_string();
    let (status, json) = t
        .send(
            "PATCH",
            &format!("/api/v1/stocks/{stock_id}"),
            Some(&admin),
            Some(json!({ "quantity": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let size = json["data"]["size"].as_i64().unwrap();
    assert_eq!(t.stock_of(&model_id, size).await, json["data"]["quantity"].as_i64().unwrap());

    let (_, json) = t.send("GET", "/api/v1/stocks/total", None, None).await;
    assert_eq!(json["data"]["total"], 15);

    let (status, json) = t
        .send(
            "PUT",
            &format!("/api/v1/stocks/{stock_id}"),
            Some(&admin),
            Some(json!({ "quantity": i32::MAX })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    assert_eq!(json["error"]["status"], 400);

    let (_, json) = t.send("GET", "/api/v1/stocks/total", None, None).await;
    assert_eq!(json["data"]["total"], 15);
}

#[tokio::test]
async fn test_image_upload_multipart() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let model_id = t.seed_model(&admin, &[(38, 1)]).await;

    let boundary = "X-BOUNDARY";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"model_id\"\r\n\r\n\
         {model_id}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"front.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\n\
         JPEGDATA\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/images")
        .header("authorization", format!("Bearer {admin}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, json) = t.call(request).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let images = json["data"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["model_id"], model_id.as_str());
    assert!(images[0]["url"].as_str().unwrap().ends_with("front.jpg"));
}

// -- Directions --

#[tokio::test]
async fn test_directions_are_scoped_to_owner() {
    let t = TestApp::new();
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let (_, bob) = t.user("bob@example.com", Role::Retail).await;

    let (status, json) = t
        .send(
            "POST",
            "/api/v1/directions",
            Some(&ana),
            Some(json!({ "street": "Av. Siempre Viva 742", "city": "Rosario", "province": "Santa Fe" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["name"], domain::DEFAULT_DIRECTION_NAME);
    let uri = format!("/api/v1/directions/{}", json["data"]["id"].as_str().unwrap());

    let (_, listed) = t.send("GET", "/api/v1/directions", Some(&bob), None).await;
    assert!(listed["data"].as_array().unwrap().is_empty());
    let (status, _) = t.send("GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send("DELETE", &uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.send("GET", &uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Orders --

#[tokio::test]
async fn test_place_order_decrements_stock_and_prices_by_role() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (reseller, token) = t.user("shop@example.com", Role::Reseller).await;
    let model_id = t.seed_model(&admin, &[(40, 5)]).await;

    let mut body = normal_order(&model_id, 40, 3);
    body["total"] = json!(1);
    let (status, json) = t
        .send("POST", "/api/v1/orders", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["user_id"], reseller.id.to_string());
    assert_eq!(json["data"]["state"], "Created");
    assert_eq!(json["data"]["kind"], "normal");
    assert_eq!(json["data"]["total"], 12000);
    assert_eq!(json["data"]["items"][0]["unit_price"], 4000);
    assert_eq!(t.stock_of(&model_id, 40).await, 2);

    let (status, json) = t
        .send(
            "POST",
            "/api/v1/orders",
            Some(&token),
            Some(normal_order(&model_id, 40, 3)),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["status"], 409);
    assert_eq!(t.stock_of(&model_id, 40).await, 2);
    assert_eq!(t.store.order_count().await, 1);
}

#[tokio::test]
async fn test_curve_order_expands_sizes() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, token) = t.user("ana@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(37, 10), (38, 10)]).await;

    let (status, json) = t
        .send(
            "POST",
            "/api/v1/orders",
            Some(&token),
            Some(json!({
                "kind": "curve",
                "lines": [{ "model_id": model_id, "curve": "1/37, 2/38", "bundles": 2 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["kind"], "curve");
    assert_eq!(json["data"]["total"], 6 * 5000);
    assert_eq!(t.stock_of(&model_id, 37).await, 8);
    assert_eq!(t.stock_of(&model_id, 38).await, 6);

    let (status, _) = t
        .send(
            "POST",
            "/api/v1/orders",
            Some(&token),
            Some(json!({
                "kind": "curve",
                "lines": [{ "model_id": model_id, "curve": "37-38", "bundles": 1 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_only_admins_order_for_others() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let (bob, _) = t.user("bob@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(40, 5)]).await;

    let mut body = normal_order(&model_id, 40, 1);
    body["user_id"] = json!(bob.id);
    let (status, _) = t
        .send("POST", "/api/v1/orders", Some(&ana), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = t
        .send("POST", "/api/v1/orders", Some(&admin), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["user_id"], bob.id.to_string());
}

#[tokio::test]
async fn test_order_visibility_and_cancel_round_trip() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let (_, bob) = t.user("bob@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(40, 5)]).await;

    let (_, json) = t
        .send("POST", "/api/v1/orders", Some(&ana), Some(normal_order(&model_id, 40, 4)))
        .await;
    let uri = format!("/api/v1/orders/{}", json["data"]["id"].as_str().unwrap());

    let (status, _) = t.send("GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, listed) = t.send("GET", "/api/v1/orders", Some(&bob), None).await;
    assert!(listed["data"].as_array().unwrap().is_empty());
    let (_, listed) = t.send("GET", "/api/v1/orders", Some(&admin), None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let (status, _) = t.send("DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = t.send("DELETE", &uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Order cancelled");
    assert_eq!(t.stock_of(&model_id, 40).await, 5);

    let (status, _) = t.send("GET", &uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(t.store.order_item_count().await, 0);
}

#[tokio::test]
async fn test_item_decrement_and_removal() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(40, 5), (41, 5)]).await;

    let (_, json) = t
        .send(
            "POST",
            "/api/v1/orders",
            Some(&ana),
            Some(json!({
                "kind": "normal",
                "lines": [
                    { "model_id": model_id, "size": 40, "quantity": 2 },
                    { "model_id": model_id, "size": 41, "quantity": 1 }
                ]
            })),
        )
        .await;
    let order_id = json["data"]["id"].as_str().unwrap().to_string();
    let item = |size: i64| {
        json["data"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|i| i["size"] == size)
            .map(|i| i["id"].as_str().unwrap().to_string())
            .unwrap()
    };
    let (item_40, item_41) = (item(40), item(41));

    let (status, json) = t
        .send(
            "POST",
            &format!("/api/v1/orders/{order_id}/items/{item_40}/decrement"),
            Some(&ana),
            Some(json!({ "total": 999 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["total"], 2 * 5000);
    assert_eq!(t.stock_of(&model_id, 40).await, 4);

    let (status, json) = t
        .send(
            "POST",
            &format!("/api/v1/orders/{order_id}/items/{item_40}/decrement"),
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(t.stock_of(&model_id, 40).await, 5);

    let (status, json) = t
        .send(
            "DELETE",
            &format!("/api/v1/orders/{order_id}/items/{item_41}"),
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(json["data"]["total"], 0);
    assert_eq!(t.stock_of(&model_id, 41).await, 5);
}

#[tokio::test]
async fn test_discount_bounds() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(40, 5)]).await;
    let (_, json) = t
        .send("POST", "/api/v1/orders", Some(&ana), Some(normal_order(&model_id, 40, 2)))
        .await;
    let uri = format!(
        "/api/v1/orders/{}/discount",
        json["data"]["id"].as_str().unwrap()
    );

    let (status, _) = t
        .send("PUT", &uri, Some(&ana), Some(json!({ "discount": 100 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .send("PUT", &uri, Some(&admin), Some(json!({ "discount": 10001 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, json) = t
        .send("PUT", &uri, Some(&admin), Some(json!({ "discount": 1500 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["discount"], 1500);
    assert_eq!(json["data"]["total"], 8500);
}

// -- Reports --

#[tokio::test]
async fn test_sales_report() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(40, 10)]).await;

    let (_, confirmed) = t
        .send("POST", "/api/v1/orders", Some(&ana), Some(normal_order(&model_id, 40, 3)))
        .await;
    t.send("POST", "/api/v1/orders", Some(&ana), Some(normal_order(&model_id, 40, 2)))
        .await;
    let (status, _) = t
        .send(
            "PATCH",
            &format!("/api/v1/orders/{}", confirmed["data"]["id"].as_str().unwrap()),
            Some(&admin),
            Some(json!({ "state": "Confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .send("GET", "/api/v1/reports/sales", Some(&ana), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = t
        .send("GET", "/api/v1/reports/sales", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let report = &json["data"];
    assert_eq!(report["order_count"], 1);
    assert_eq!(report["units_sold"], 3);
    assert_eq!(report["total_sales"], 15000);
    assert_eq!(report["gross_revenue"], 15000);
    assert_eq!(report["net_profit"], 9000);
    assert_eq!(report["best_seller"]["model_id"], model_id.as_str());

    let (_, json) = t
        .send(
            "GET",
            "/api/v1/reports/sales?states=Created,Confirmed",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(json["data"]["units_sold"], 5);

    let (status, _) = t
        .send(
            "GET",
            "/api/v1/reports/sales?from=2024-02-01&to=2024-01-01",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Payments --

async fn webhook(t: &TestApp, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
    let bytes = serde_json::to_vec(body).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-signature", signature);
    }
    t.call(builder.body(Body::from(bytes)).unwrap()).await
}

#[tokio::test]
async fn test_payment_link_and_webhook() {
    let t = TestApp::new();
    let (_, admin) = t.user("admin@example.com", Role::Admin).await;
    let (_, ana) = t.user("ana@example.com", Role::Retail).await;
    let model_id = t.seed_model(&admin, &[(40, 5)]).await;
    let (_, json) = t
        .send("POST", "/api/v1/orders", Some(&ana), Some(normal_order(&model_id, 40, 1)))
        .await;
    let uri = format!("/api/v1/orders/{}", json["data"]["id"].as_str().unwrap());

    let (status, json) = t
        .send("PATCH", &uri, Some(&admin), Some(json!({ "payment_link": "pay-123" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["state"], "Payment Sent");

    let event = json!({ "reference": "pay-123", "status": "approved" });
    let (status, _) = webhook(&t, &event, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = webhook(&t, &event, Some("deadbeef".to_string())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signature = domain::sign_payload(
        WEBHOOK_SECRET.as_bytes(),
        &serde_json::to_vec(&event).unwrap(),
    );
    let (status, json) = webhook(&t, &event, Some(signature)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["state"], "Confirmed");
    assert_eq!(json["data"]["paid"], true);

    let unknown = json!({ "reference": "pay-999", "status": "approved" });
    let signature = domain::sign_payload(
        WEBHOOK_SECRET.as_bytes(),
        &serde_json::to_vec(&unknown).unwrap(),
    );
    let (status, _) = webhook(&t, &unknown, Some(signature)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
