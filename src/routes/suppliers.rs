//! Supplier administration and dropshipping.

use axum::{
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::{authorize, Capability, Principal};
use crate::domain::aggregates::{CreateSupplier, Product, Supplier, SupplierPatch, SupplierSettings};
use crate::services::dropshipping::CatalogQuery;
use crate::error::{Result, ValidatedJson};
use crate::state::AppState;
use crate::store::Query;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route("/:id", get(get_supplier).put(update_supplier).delete(delete_supplier))
        .route("/:id/products", get(supplier_products))
        .route("/:id/catalog", get(supplier_catalog))
        .route("/:id/check-connection", get(check_connection))
        .route("/:id/import/:product_id", post(import_product))
        .route("/:id/sync-inventory", post(sync_inventory))
        .route("/:id/orders", post(place_supplier_order))
        .route("/:id/orders/:order_id", get(supplier_order_status))
        .route("/:id/settings", put(configure_settings))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct PlaceSupplierOrder {
    #[validate(length(min = 1))]
    order_id: String,
}

async fn list_suppliers(principal: Principal, State(state): State<AppState>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let suppliers = state.collection::<Supplier>().all().await?;
    Ok(Json(json!({ "success": true, "suppliers": suppliers })))
}

async fn get_supplier(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let supplier = state.collection::<Supplier>().get(&id).await?;
    Ok(Json(json!({ "success": true, "supplier": supplier })))
}

async fn create_supplier(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateSupplier>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let supplier = state.collection::<Supplier>().create(&body).await?;
    tracing::info!(supplier_id = %supplier.id, name = %supplier.name, "Supplier created");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "supplier": supplier }))))
}

async fn update_supplier(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<SupplierPatch>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let suppliers = state.collection::<Supplier>();
    suppliers.get(&id).await?;
    let supplier = suppliers.update(&id, &patch).await?;
    Ok(Json(json!({ "success": true, "supplier": supplier })))
}

async fn delete_supplier(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let suppliers = state.collection::<Supplier>();
    suppliers.get(&id).await?;
    suppliers.delete(&id).await?;
    Ok(Json(json!({ "success": true, "result": { "id": id, "deleted": true } })))
}

async fn supplier_products(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let supplier = state.collection::<Supplier>().get(&id).await?;
    let products = state.collection::<Product>().query(&Query::new().eq("supplierId", id)).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("{} products from {}", products.len(), supplier.name),
        "products": products,
    })))
}

async fn supplier_catalog(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<CatalogQuery>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let products = state.dropshipping().catalog(&id, &query).await?;
    Ok(Json(json!({ "success": true, "products": products })))
}

async fn check_connection(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let connection = state.dropshipping().check_connection(&id).await?;
    Ok(Json(json!({ "success": true, "connection": connection })))
}

async fn import_product(
    principal: Principal,
    State(state): State<AppState>,
    Path((id, product_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let product = state.dropshipping().import_product(&id, &product_id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "product": product }))))
}

async fn sync_inventory(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let report = state.dropshipping().sync_supplier(&id).await?;
    Ok(Json(json!({ "success": true, "result": report })))
}

async fn place_supplier_order(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<PlaceSupplierOrder>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let order = state.dropshipping().place_order(&id, &body.order_id).await?;
    Ok(Json(json!({ "success": true, "order": order })))
}

async fn supplier_order_status(
    principal: Principal,
    State(state): State<AppState>,
    Path((id, order_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let order = state.dropshipping().order_status(&id, &order_id).await?;
    Ok(Json(json!({ "success": true, "order": order })))
}

async fn configure_settings(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<SupplierSettings>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let supplier = state.dropshipping().configure(&id, body.settings).await?;
    Ok(Json(json!({ "success": true, "supplier": supplier })))
}
