use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    routes::org_ledger,
    schemas::{parse_uuid, OrgPath, TemplatePath, TemplatesQuery},
    services::{
        changes::{ChangeSet, Mutation},
        recurring,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/organizations/{org_id}/recurring-templates",
            axum::routing::get(list_templates),
        )
        .route(
            "/organizations/{org_id}/recurring-templates/{template_id}/advance",
            axum::routing::post(advance_template),
        )
}

async fn list_templates(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Query(query): Query<TemplatesQuery>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    let data = ledger
        .templates
        .iter()
        .filter(|template| query.active.map_or(true, |active| template.active == active))
        .map(|template| {
            json!({
                "template": template,
                "next_description": recurring::render_description(template, template.next_due_date),
            })
        })
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": data })))
}

async fn advance_template(
    State(state): State<AppState>,
    Path(path): Path<TemplatePath>,
) -> AppResult<Json<Value>> {
    let template_id = parse_uuid(&path.template_id, "template_id")?;
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let template = ledger
        .template(template_id)
        .ok_or_else(|| AppError::NotFound(format!("Recurring template {template_id} was not found.")))?;

    let advanced = recurring::advance(template)?;
    ledger.apply(&ChangeSet::from(vec![Mutation::UpdateRecurringTemplate(
        advanced.clone(),
    )]))?;
    Ok(Json(json!(advanced)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::test_support::{call, test_app};

    #[tokio::test]
    async fn lists_and_advances_rent_template() {
        let app = test_app();
        let (_, org) = call(
            &app,
            Method::POST,
            "/v1/organizations",
            Some(json!({ "name": "Acme" })),
        )
        .await;
        let base = format!("/v1/organizations/{}", org["id"].as_str().expect("org id"));
        call(
            &app,
            Method::POST,
            &format!("{base}/categories"),
            Some(json!({ "name": "Rental Income", "role": "rental_income" })),
        )
        .await;
        let (_, tenant) = call(
            &app,
            Method::POST,
            &format!("{base}/contacts"),
            Some(json!({ "name": "Ana", "kind": "tenant" })),
        )
        .await;
        let (_, property) = call(
            &app,
            Method::POST,
            &format!("{base}/properties"),
            Some(json!({ "name": "Unit 1" })),
        )
        .await;
        let (status, created) = call(
            &app,
            Method::POST,
            &format!("{base}/agreements"),
            Some(json!({
                "tenant_id": tenant["id"],
                "property_id": property["id"],
                "start_date": "2026-01-15",
                "end_date": "2026-12-31",
                "monthly_rent": 30000.0,
                "rent_due_day": 5,
                "generate_invoices": true,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["documents"]["template"]["next_due_date"], "2026-02-15");

        let (_, listed) = call(
            &app,
            Method::GET,
            &format!("{base}/recurring-templates?active=true"),
            None,
        )
        .await;
        assert_eq!(listed["data"][0]["next_description"], "Rent for February 2026");

        let template_id = created["documents"]["template"]["id"].as_str().expect("template id");
        let (status, advanced) = call(
            &app,
            Method::POST,
            &format!("{base}/recurring-templates/{template_id}/advance"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(advanced["next_due_date"], "2026-03-05");
    }
}
