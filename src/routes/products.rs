//! Catalog handlers: products and categories.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::{authorize, Capability, OptionalPrincipal, Principal};
use crate::domain::aggregates::{Category, CategoryPatch, CreateCategory, CreateProduct, Product, ProductPatch};
use crate::error::{Result, ValidatedJson};
use crate::state::AppState;
use crate::store::{Direction, Query};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/featured", get(featured_products))
        .route("/category/:category", get(products_by_category))
        .route("/search/:query", get(search_products))
        .route("/categories/all", get(list_categories))
        .route("/categories", post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/:id/sync-inventory", post(sync_inventory))
}

/// Inactive products are only listed for catalog staff.
fn visible_to(principal: &Option<Principal>) -> impl Fn(&Product) -> bool {
    let staff = principal.as_ref().is_some_and(|p| authorize(p, Capability::ManageCatalog, None).is_ok());
    move |product| staff || product.is_active
}

async fn list_products(State(state): State<AppState>, OptionalPrincipal(caller): OptionalPrincipal) -> Result<Json<Value>> {
    let products = state.collection::<Product>().all().await?;
    let products: Vec<_> = products.into_iter().filter(visible_to(&caller)).collect();
    Ok(Json(json!({ "success": true, "products": products })))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let product = state.collection::<Product>().get(&id).await?;
    Ok(Json(json!({ "success": true, "product": product })))
}

async fn featured_products(State(state): State<AppState>) -> Result<Json<Value>> {
    let query = Query::new().eq("isFeatured", true).eq("isActive", true);
    let products = state.collection::<Product>().query(&query).await?;
    Ok(Json(json!({ "success": true, "products": products })))
}

async fn products_by_category(
    State(state): State<AppState>,
    OptionalPrincipal(caller): OptionalPrincipal,
    Path(category): Path<String>,
) -> Result<Json<Value>> {
    let products = state.collection::<Product>().query(&Query::new().eq("category", category)).await?;
    let products: Vec<_> = products.into_iter().filter(visible_to(&caller)).collect();
    Ok(Json(json!({ "success": true, "products": products })))
}

async fn search_products(
    State(state): State<AppState>,
    OptionalPrincipal(caller): OptionalPrincipal,
    Path(needle): Path<String>,
) -> Result<Json<Value>> {
    let visible = visible_to(&caller);
    let products: Vec<_> = state
        .collection::<Product>()
        .all()
        .await?
        .into_iter()
        .filter(|p| visible(p) && p.matches_search(&needle))
        .collect();
    tracing::debug!(query = %needle, hits = products.len(), "Product search");
    Ok(Json(json!({ "success": true, "products": products })))
}

async fn create_product(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateProduct>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&principal, Capability::ManageCatalog, None)?;
    let product = state.collection::<Product>().create(&body.into_product()).await?;
    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "product": product }))))
}

async fn update_product(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<ProductPatch>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCatalog, None)?;
    let products = state.collection::<Product>();
    products.get(&id).await?;
    let product = products.update(&id, &patch).await?;
    Ok(Json(json!({ "success": true, "product": product })))
}

async fn delete_product(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCatalog, None)?;
    let products = state.collection::<Product>();
    products.get(&id).await?;
    products.delete(&id).await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(Json(json!({ "success": true, "result": { "id": id, "deleted": true } })))
}

/// Refresh a dropshipped product's stock from its supplier.
async fn sync_inventory(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageSuppliers, None)?;
    let sync = state.dropshipping().sync_inventory(&id).await?;
    Ok(Json(json!({ "success": true, "result": sync })))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Value>> {
    let query = Query::new().order_by("order", Direction::Asc);
    let categories = state.collection::<Category>().query(&query).await?;
    Ok(Json(json!({ "success": true, "categories": categories })))
}

async fn create_category(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateCategory>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&principal, Capability::ManageCatalog, None)?;
    let category = state.collection::<Category>().create(&body.into_category()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "category": category }))))
}

async fn update_category(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<CategoryPatch>,
) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCatalog, None)?;
    let categories = state.collection::<Category>();
    categories.get(&id).await?;
    let category = categories.update(&id, &patch).await?;
    Ok(Json(json!({ "success": true, "category": category })))
}

async fn delete_category(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    authorize(&principal, Capability::ManageCatalog, None)?;
    let categories = state.collection::<Category>();
    categories.get(&id).await?;
    categories.delete(&id).await?;
    Ok(Json(json!({ "success": true, "result": { "id": id, "deleted": true } })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::TestApp;
    use crate::services::dropshipping::testing::FakeSupplierApi;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_inventory_of_one_product() {
        let app = TestApp::with_suppliers(FakeSupplierApi::new().with_product("SUP-009", "Lantern", 25, 11));
        let admin = app.login("a1", "admin").await;
        let supplier = app
            .store
            .create("suppliers", json!({"name": "Trailhead", "apiEndpoint": "https://trailhead.test", "isActive": true}))
            .await
            .unwrap()
            .id;
        let linked = app
            .store
            .create(
                "products",
                json!({"name": "Lantern", "price": 30, "inventory": 1, "supplierId": supplier, "supplierProductId": "SUP-009"}),
            )
            .await
            .unwrap()
            .id;
        let plain = app.store.create("products", json!({"name": "Mug", "price": 5})).await.unwrap().id;

        let (status, body) = app.call(Method::POST, &format!("/api/products/{linked}/sync-inventory"), Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["inventory"], json!(11));
        assert_eq!(body["result"]["previous"], json!(1));

        let (status, body) = app.call(Method::POST, &format!("/api/products/{plain}/sync-inventory"), Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Product is not linked to a supplier"));
    }

    #[tokio::test]
    async fn test_catalog_writes_need_staff() {
        let app = TestApp::new();
        let body = json!({"name": "Mug", "price": 12.5});

        let (status, _) = app.call(Method::POST, "/api/products", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let customer = app.login("c1", "customer").await;
        let (status, _) = app.call(Method::POST, "/api/products", Some(&customer), Some(body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let manager = app.login("m1", "manager").await;
        let (status, created) = app.call(Method::POST, "/api/products", Some(&manager), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["product"]["price"], json!(12.5));
        assert_eq!(created["product"]["ratings"], json!({"average": 0.0, "count": 0}));
    }

    #[tokio::test]
    async fn test_public_listing_hides_inactive() {
        let app = TestApp::new();
        app.store.create("products", json!({"name": "Mug", "price": 5, "category": "Kitchen"})).await.unwrap();
        app.store
            .create("products", json!({"name": "Old Mug", "price": 5, "category": "Kitchen", "isActive": false}))
            .await
            .unwrap();

        let (_, body) = app.call(Method::GET, "/api/products", None, None).await;
        assert_eq!(body["products"].as_array().unwrap().len(), 1);

        let admin = app.login("a1", "admin").await;
        let (_, body) = app.call(Method::GET, "/api/products/category/Kitchen", Some(&admin), None).await;
        assert_eq!(body["products"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_and_featured() {
        let app = TestApp::new();
        app.store
            .create("products", json!({"name": "Espresso Cup", "price": 4, "isFeatured": true}))
            .await
            .unwrap();
        app.store.create("products", json!({"name": "Teapot", "price": 20})).await.unwrap();

        let (_, body) = app.call(Method::GET, "/api/products/search/ESPRESSO", None, None).await;
        assert_eq!(body["products"][0]["name"], json!("Espresso Cup"));
        assert_eq!(body["products"].as_array().unwrap().len(), 1);

        let (_, body) = app.call(Method::GET, "/api/products/featured", None, None).await;
        assert_eq!(body["products"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_product_is_404() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/api/products/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_category_lifecycle() {
        let app = TestApp::new();
        let admin = app.login("a1", "admin").await;
        let (status, created) =
            app.call(Method::POST, "/api/products/categories", Some(&admin), Some(json!({"name": "Kitchen"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["category"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/products/categories/{id}");
        let (_, updated) = app.call(Method::PUT, &uri, Some(&admin), Some(json!({"order": 2}))).await;
        assert_eq!(updated["category"]["order"], json!(2));
        assert_eq!(updated["category"]["name"], json!("Kitchen"));

        app.call(Method::DELETE, &uri, Some(&admin), None).await;
        let (_, list) = app.call(Method::GET, "/api/products/categories/all", None, None).await;
        assert!(list["categories"].as_array().unwrap().is_empty());
    }
}
