use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono_tz::Tz;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Category, Contact, NumberingSeries, Property},
    routes::org_ledger,
    schemas::{
        validate_input, CreateCategoryInput, CreateContactInput, CreateOrganizationInput,
        CreatePropertyInput, NumberingSeriesInput, OrgPath, PropertiesQuery, SeriesPath,
    },
    services::{
        agreement_view::AgreementView,
        changes::{ChangeSet, Mutation},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/organizations",
            axum::routing::post(create_organization),
        )
        .route(
            "/organizations/{org_id}",
            axum::routing::get(get_organization),
        )
        .route(
            "/organizations/{org_id}/numbering",
            axum::routing::get(list_numbering),
        )
        .route(
            "/organizations/{org_id}/numbering/{kind}",
            axum::routing::put(put_numbering),
        )
        .route(
            "/organizations/{org_id}/categories",
            axum::routing::get(list_categories).post(create_category),
        )
        .route(
            "/organizations/{org_id}/properties",
            axum::routing::get(list_properties).post(create_property),
        )
        .route(
            "/organizations/{org_id}/contacts",
            axum::routing::get(list_contacts).post(create_contact),
        )
}

async fn create_organization(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let timezone = payload
        .timezone
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(state.config.default_timezone.as_str())
        .to_string();
    if timezone.parse::<Tz>().is_err() {
        return Err(AppError::BadRequest(format!(
            "Unknown timezone '{timezone}'."
        )));
    }

    let organization = state
        .store
        .create_organization(&payload.name, &timezone, &state.config)
        .await;
    Ok((StatusCode::CREATED, Json(json!(organization))))
}

async fn get_organization(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    let active_agreements = ledger
        .agreements
        .iter()
        .filter(|agreement| agreement.is_active())
        .count();
    let open_invoices = ledger
        .invoices
        .iter()
        .filter(|invoice| invoice.is_open())
        .count();

    Ok(Json(json!({
        "organization": ledger.organization,
        "counts": {
            "agreements": ledger.agreements.len(),
            "active_agreements": active_agreements,
            "invoices": ledger.invoices.len(),
            "open_invoices": open_invoices,
            "properties": ledger.properties.len(),
            "contacts": ledger.contacts.len(),
        },
    })))
}

async fn list_numbering(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    Ok(Json(json!({ "data": ledger.series })))
}

async fn put_numbering(
    State(state): State<AppState>,
    Path(path): Path<SeriesPath>,
    Json(payload): Json<NumberingSeriesInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let (org_id, shared) = org_ledger(&state, &path.org_id).await?;
    let series = NumberingSeries {
        kind: path.kind,
        prefix: payload.prefix.trim().to_string(),
        padding: payload.padding,
        next_number: payload.next_number,
    };

    let mut ledger = shared.lock().await;
    ledger.apply(&ChangeSet::from(vec![Mutation::UpdateNumberingSeries(
        series.clone(),
    )]))?;
    tracing::info!(
        org_id = %org_id,
        kind = series.kind.label(),
        prefix = %series.prefix,
        "Numbering series configured"
    );
    Ok(Json(json!(series)))
}

async fn list_categories(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    Ok(Json(json!({ "data": ledger.categories })))
}

async fn create_category(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Json(payload): Json<CreateCategoryInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;

    if let Some(role) = payload.role {
        if ledger
            .categories
            .iter()
            .any(|category| category.role == Some(role))
        {
            return Err(AppError::Conflict(format!(
                "A category with role {} already exists.",
                role.legacy_name()
            )));
        }
    }

    let category = Category {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        role: payload.role,
    };
    ledger.categories.push(category.clone());
    Ok((StatusCode::CREATED, Json(json!(category))))
}

async fn list_properties(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Query(query): Query<PropertiesQuery>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    let data = if query.available.unwrap_or(false) {
        json!(AgreementView::new(&ledger).available_properties(&ledger.properties))
    } else {
        json!(ledger.properties)
    };
    Ok(Json(json!({ "data": data })))
}

async fn create_property(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let property = Property {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        owner_id: payload.owner_uuid()?,
        building_id: payload.building_uuid()?,
    };
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    shared.lock().await.properties.push(property.clone());
    Ok((StatusCode::CREATED, Json(json!(property))))
}

async fn list_contacts(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    Ok(Json(json!({ "data": ledger.contacts })))
}

async fn create_contact(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Json(payload): Json<CreateContactInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let contact = Contact {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        kind: payload.kind,
        email: payload.email,
        phone_e164: payload.phone_e164,
    };
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    shared.lock().await.contacts.push(contact.clone());
    Ok((StatusCode::CREATED, Json(json!(contact))))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::test_support::{call, test_app};

    #[tokio::test]
    async fn creates_organization_with_seeded_numbering() {
        let app = test_app();
        let (status, org) = call(
            &app,
            Method::POST,
            "/v1/organizations",
            Some(json!({ "name": "Acme Rentals" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(org["timezone"], "America/Asuncion");

        let uri = format!("/v1/organizations/{}/numbering", org["id"].as_str().unwrap());
        let (status, series) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(series["data"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn rejects_unknown_timezone_and_missing_org() {
        let app = test_app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/organizations",
            Some(json!({ "name": "Acme", "timezone": "Mars/Olympus" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");

        let (status, _) = call(
            &app,
            Method::GET,
            "/v1/organizations/7f1b0b36-5d7c-4c59-8d0e-0c8f5a3b2a10",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reconfigures_series_and_refuses_duplicate_roles() {
        let app = test_app();
        let (_, org) = call(
            &app,
            Method::POST,
            "/v1/organizations",
            Some(json!({ "name": "Acme" })),
        )
        .await;
        let base = format!("/v1/organizations/{}", org["id"].as_str().unwrap());

        let (status, series) = call(
            &app,
            Method::PUT,
            &format!("{base}/numbering/invoice"),
            Some(json!({ "prefix": "FAC-", "padding": 6, "next_number": 40 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(series["prefix"], "FAC-");

        let category = json!({ "name": "Deposits", "role": "security_deposit" });
        let (status, _) = call(&app, Method::POST, &format!("{base}/categories"), Some(category.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(&app, Method::POST, &format!("{base}/categories"), Some(category)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
