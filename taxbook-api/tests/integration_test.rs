/// Integration tests for the Taxbook API
///
/// The first group drives the router against a database server that never
/// answers and checks how the HTTP layer reports each failure. The second
/// group needs a live MySQL server (`DB_*` variables) and is ignored by
/// default:
///
/// ```bash
/// cargo test -p taxbook-api -- --ignored
/// ```

mod common;

use axum::http::StatusCode;
use common::{body_json, json_request, TestContext};
use serde_json::json;

fn tenant_body(tax_id: &str) -> serde_json::Value {
    json!({
        "seller_ntn_cnic": tax_id,
        "seller_business_name": "Acme Textiles",
        "seller_province": "Punjab",
        "seller_address": "Mall Road, Lahore"
    })
}

#[tokio::test]
async fn test_health_reports_degraded_without_database() {
    let ctx = TestContext::offline();

    let response = ctx.send(json_request("GET", "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["cached_tenants"], 0);
}

#[tokio::test]
async fn test_tenant_routes_require_tenant_header() {
    let ctx = TestContext::offline();

    for uri in ["/v1/buyers", "/v1/products", "/v1/invoices", "/v1/invoices/1"] {
        let response = ctx.send(json_request("GET", uri, None, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let body = body_json(response).await;
        assert_eq!(body["error"], "bad_request");
    }

    let response = ctx.send(json_request("GET", "/v1/buyers", Some("   "), None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let ctx = TestContext::offline();

    let response = ctx.send(json_request("GET", "/v1/nothing-here", None, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_tenant_validation() {
    let ctx = TestContext::offline();

    let response = ctx
        .send(json_request(
            "POST",
            "/v1/admin/tenants",
            None,
            Some(json!({ "seller_ntn_cnic": "", "seller_business_name": "" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"seller_ntn_cnic"));
    assert!(fields.contains(&"seller_business_name"));
}

#[tokio::test]
async fn test_create_tenant_rejects_unsafe_database_name() {
    let ctx = TestContext::offline();

    let mut body = tenant_body("T-001");
    body["database_name"] = json!("tenant`; DROP DATABASE fbr_master; --");

    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(body)))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_tenant_rejects_reserved_database_names() {
    let ctx = TestContext::offline();

    // Rejected before the unreachable registry is consulted
    for name in ["fbr_master", "Fbr_Master", "mysql", "sys", "performance_schema", "information_schema"] {
        let mut body = tenant_body("T-001");
        body["database_name"] = json!(name);

        let response = ctx
            .send(json_request("POST", "/v1/admin/tenants", None, Some(body)))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{}", name);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_unreachable_master_is_service_unavailable() {
    let ctx = TestContext::offline();

    let response = ctx
        .send(json_request("GET", "/v1/buyers", Some("tenant_1_abc"), None))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(tenant_body("T-001"))))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = ctx
        .send(json_request("GET", "/v1/admin/tenants", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants/tenant_1_abc/deactivate", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Nothing was cached for the failed lookups
    assert_eq!(ctx.state.tenants.cached_count().await, 0);
}

fn unique_tax_id() -> String {
    format!("IT-{}", now_millis())
}

fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis()
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_tenant_lifecycle_over_http() {
    let ctx = TestContext::online().await.unwrap();
    let tax_id = unique_tax_id();

    // Provision
    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(tenant_body(&tax_id))))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let tenant_id = created["tenant"]["tenant_id"].as_str().unwrap().to_string();
    let database_name = created["database_name"].as_str().unwrap().to_string();
    assert_eq!(created["tenant"]["provisioning_state"], "schema_ready");
    assert_eq!(created["tenant"]["is_active"], true);

    // Same tax identifier again
    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(tenant_body(&tax_id))))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Duplicate buyer tax identifiers are accepted
    for name in ["Karachi Traders", "Karachi Traders (Branch)"] {
        let response = ctx
            .send(json_request(
                "POST",
                "/v1/buyers",
                Some(&tenant_id),
                Some(json!({
                    "buyer_ntn_cnic": "1234567-8",
                    "buyer_business_name": name,
                    "buyer_province": "Sindh",
                    "buyer_registration_type": "Registered"
                })),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = ctx
        .send(json_request("GET", "/v1/buyers?ntn_cnic=1234567-8", Some(&tenant_id), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["buyers"].as_array().unwrap().len(), 2);

    // Invoice with a draft snapshot
    let response = ctx
        .send(json_request(
            "POST",
            "/v1/invoices",
            Some(&tenant_id),
            Some(json!({
                "invoice_number": "INV-0001",
                "invoice_date": "2025-01-15",
                "buyer_ntn_cnic": "1234567-8",
                "buyer_business_name": "Karachi Traders",
                "buyer_province": "Sindh",
                "buyer_registration_type": "Registered",
                "items": [{
                    "hs_code": "5205.1100",
                    "product_description": "Cotton Yarn",
                    "rate": "18%",
                    "uom": "KG",
                    "quantity": "10",
                    "unit_price": "100"
                }]
            })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let invoice = body_json(response).await;
    let invoice_id = invoice["invoice"]["id"].as_i64().unwrap();

    let response = ctx
        .send(json_request(
            "POST",
            &format!("/v1/invoices/{}/post", invoice_id),
            Some(&tenant_id),
            Some(json!({ "fbr_invoice_number": "7000007DI1747119701593" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["invoice"]["status"], "posted");

    let response = ctx
        .send(json_request(
            "GET",
            &format!("/v1/invoices/{}/backups", invoice_id),
            Some(&tenant_id),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let backups = body_json(response).await;
    assert_eq!(backups["backups"].as_array().unwrap().len(), 2);
    assert_eq!(backups["summary"]["total_backups"], 2);
    assert_eq!(backups["summary"]["last_backup_type"], "posted");

    // Back-office read by database name
    let response = ctx
        .send(json_request(
            "GET",
            &format!("/v1/admin/databases/{}/invoices", database_name),
            None,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert_eq!(listing["tenant_id"], tenant_id.as_str());
    assert_eq!(listing["invoices"].as_array().unwrap().len(), 1);

    ctx.cleanup().await;
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_unknown_tenant_is_not_found() {
    let ctx = TestContext::online().await.unwrap();

    let response = ctx
        .send(json_request("GET", "/v1/invoices", Some("tenant_0_missing"), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx
        .send(json_request("GET", "/v1/admin/databases/tenant_missing/invoices", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    ctx.cleanup().await;
}

fn invoice_body(invoice_number: &str) -> serde_json::Value {
    json!({
        "invoice_number": invoice_number,
        "invoice_date": "2025-01-15",
        "buyer_ntn_cnic": "1234567-8",
        "buyer_business_name": "Karachi Traders",
        "buyer_province": "Sindh",
        "buyer_registration_type": "Registered",
        "items": [{
            "hs_code": "5205.1100",
            "product_description": "Cotton Yarn",
            "rate": "18%",
            "uom": "KG",
            "quantity": "10",
            "unit_price": "100"
        }]
    })
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_invoice_is_created_when_snapshot_fails() {
    let ctx = TestContext::online().await.unwrap();

    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(tenant_body(&unique_tax_id()))))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let tenant_id = body_json(response).await["tenant"]["tenant_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resolved = ctx.state.tenants.resolve(&tenant_id).await.unwrap();
    for table in ["invoice_backup_summary", "invoice_backups"] {
        sqlx::query(&format!("DROP TABLE {}", table))
            .execute(&resolved.handle.pool)
            .await
            .unwrap();
    }

    let response = ctx
        .send(json_request("POST", "/v1/invoices", Some(&tenant_id), Some(invoice_body("INV-0001"))))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let invoice_id = body_json(response).await["invoice"]["id"].as_i64().unwrap();

    let response = ctx
        .send(json_request(
            "POST",
            &format!("/v1/invoices/{}/post", invoice_id),
            Some(&tenant_id),
            Some(json!({ "fbr_invoice_number": "7000007DI1747119701593" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The invoice committed even though no snapshot was written
    let response = ctx
        .send(json_request("GET", &format!("/v1/invoices/{}", invoice_id), Some(&tenant_id), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["invoice"]["status"], "posted");

    ctx.cleanup().await;
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_deactivated_tenant_stops_resolving() {
    let ctx = TestContext::online().await.unwrap();
    let tax_id = unique_tax_id();

    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(tenant_body(&tax_id))))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let tenant_id = body_json(response).await["tenant"]["tenant_id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/v1/admin/tenants/{}/deactivate", tenant_id);
    let response = ctx.send(json_request("POST", &uri, None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["is_active"], false);

    let response = ctx
        .send(json_request("GET", "/v1/invoices", Some(&tenant_id), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Already inactive
    let response = ctx.send(json_request("POST", &uri, None, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The inactive row still owns its tax identifier
    let response = ctx
        .send(json_request("POST", "/v1/admin/tenants", None, Some(tenant_body(&tax_id))))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    ctx.cleanup().await;
}
