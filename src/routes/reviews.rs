//! Review handlers. Every write that can move a product's rating triggers
//! a recompute.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::{authorize, Capability, Principal};
use crate::domain::aggregates::review::{HELPFUL_VOTES, PRODUCT_ID};
use crate::domain::aggregates::{CreateReview, Product, Review, ReviewPatch};
use crate::domain::events::DomainEvent;
use crate::error::{ApiError, Result, ValidatedJson};
use crate::state::AppState;
use crate::store::{Direction, Query, StoreError, CREATED_AT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_review))
        .route("/product/:product_id", get(product_reviews))
        .route("/:id", get(get_review).put(update_review).delete(delete_review))
        .route("/:id/helpful", post(vote_helpful))
}

async fn product_reviews(State(state): State<AppState>, Path(product_id): Path<String>) -> Result<Json<Value>> {
    let query = Query::new().eq(PRODUCT_ID, product_id).order_by(CREATED_AT, Direction::Desc);
    let reviews = state.collection::<Review>().query(&query).await?;
    Ok(Json(json!({ "success": true, "reviews": reviews })))
}

async fn get_review(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let review = state.collection::<Review>().get(&id).await?;
    Ok(Json(json!({ "success": true, "review": review })))
}

async fn create_review(
    principal: Principal,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateReview>,
) -> Result<(StatusCode, Json<Value>)> {
    match state.collection::<Product>().get(&body.product_id).await {
        Ok(_) => {}
        Err(StoreError::NotFound { .. }) => {
            return Err(ApiError::NotFound(format!("Product {} not found", body.product_id)))
        }
        Err(e) => return Err(e.into()),
    }

    let verified = state.orders().has_purchased(&principal.uid, &body.product_id).await?;
    let review = body.into_review(&principal.uid, principal.display_name(), verified);
    let review = state.collection::<Review>().create(&review).await?;
    tracing::info!(review_id = %review.id, product_id = %review.product_id, rating = review.rating, verified, "Review created");

    state.ratings().recompute(&review.product_id).await?;
    state
        .events()
        .publish(DomainEvent::ReviewCreated {
            review_id: review.id.clone(),
            product_id: review.product_id.clone(),
            rating: review.rating,
        })
        .await;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "review": review }))))
}

async fn update_review(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<ReviewPatch>,
) -> Result<Json<Value>> {
    let reviews = state.collection::<Review>();
    let existing = reviews.get(&id).await?;
    authorize(&principal, Capability::ModifyReview, Some(&existing.user_id))?;

    let review = reviews.update(&id, &patch).await?;
    if patch.changes_rating_of(&existing) {
        state.ratings().recompute(&review.product_id).await?;
    }
    state
        .events()
        .publish(DomainEvent::ReviewUpdated { review_id: review.id.clone(), product_id: review.product_id.clone() })
        .await;
    Ok(Json(json!({ "success": true, "review": review })))
}

async fn delete_review(principal: Principal, State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let reviews = state.collection::<Review>();
    let existing = reviews.get(&id).await?;
    authorize(&principal, Capability::ModifyReview, Some(&existing.user_id))?;

    reviews.delete(&id).await?;
    state.ratings().recompute(&existing.product_id).await?;
    tracing::info!(review_id = %id, product_id = %existing.product_id, "Review deleted");
    state
        .events()
        .publish(DomainEvent::ReviewDeleted { review_id: id.clone(), product_id: existing.product_id })
        .await;
    Ok(Json(json!({ "success": true, "result": { "id": id, "deleted": true } })))
}

/// Anyone may vote; the counter is bumped in place.
async fn vote_helpful(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let review = state.collection::<Review>().increment(&id, HELPFUL_VOTES, 1).await?;
    Ok(Json(json!({ "success": true, "review": review })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    async fn ratings_of(app: &TestApp, product_id: &str) -> Value {
        let (_, body) = app.call(Method::GET, &format!("/api/products/{product_id}"), None, None).await;
        body["product"]["ratings"].clone()
    }

    async fn review(app: &TestApp, bearer: &str, product_id: &str, rating: u8) -> String {
        let (status, body) = app
            .call(Method::POST, "/api/reviews", Some(bearer), Some(json!({"productId": product_id, "rating": rating})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["review"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_ratings_follow_reviews() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 12.5})).await.unwrap().id;
        let (ada, bob, cy) = (app.login("ada", "customer").await, app.login("bob", "customer").await, app.login("cy", "customer").await);

        let first = review(&app, &ada, &mug, 4).await;
        let second = review(&app, &bob, &mug, 5).await;
        let third = review(&app, &cy, &mug, 3).await;
        assert_eq!(ratings_of(&app, &mug).await, json!({"average": 4.0, "count": 3}));

        app.call(Method::DELETE, &format!("/api/reviews/{third}"), Some(&cy), None).await;
        assert_eq!(ratings_of(&app, &mug).await, json!({"average": 4.5, "count": 2}));

        app.call(Method::DELETE, &format!("/api/reviews/{first}"), Some(&ada), None).await;
        app.call(Method::DELETE, &format!("/api/reviews/{second}"), Some(&bob), None).await;
        assert_eq!(ratings_of(&app, &mug).await, json!({"average": 0.0, "count": 0}));
    }

    #[tokio::test]
    async fn test_rating_change_recomputes() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 12.5})).await.unwrap().id;
        let ada = app.login("ada", "customer").await;
        let id = review(&app, &ada, &mug, 2).await;

        let (status, body) =
            app.call(Method::PUT, &format!("/api/reviews/{id}"), Some(&ada), Some(json!({"rating": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review"]["rating"], json!(5));
        assert_eq!(ratings_of(&app, &mug).await, json!({"average": 5.0, "count": 1}));
    }

    #[tokio::test]
    async fn test_only_author_or_admin_may_edit() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 12.5})).await.unwrap().id;
        let ada = app.login("ada", "customer").await;
        let bob = app.login("bob", "customer").await;
        let admin = app.login("root", "admin").await;
        let id = review(&app, &ada, &mug, 4).await;
        let uri = format!("/api/reviews/{id}");

        let (status, _) = app.call(Method::PUT, &uri, Some(&bob), Some(json!({"title": "mine now"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verified_purchase_and_author_name() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 12.5})).await.unwrap().id;
        app.store
            .create(
                "orders",
                json!({"userId": "ada", "status": "completed", "subtotal": 12.5, "total": 12.5,
                       "items": [{"productId": mug, "name": "Mug", "price": 12.5, "quantity": 1}]}),
            )
            .await
            .unwrap();
        let ada = app.login("ada", "customer").await;
        let bob = app.login("bob", "customer").await;

        review(&app, &ada, &mug, 5).await;
        review(&app, &bob, &mug, 3).await;
        let (_, body) = app.call(Method::GET, &format!("/api/reviews/product/{mug}"), None, None).await;
        let reviews = body["reviews"].as_array().unwrap();
        let by = |uid: &str| reviews.iter().find(|r| r["userId"] == json!(uid)).unwrap().clone();
        assert_eq!(by("ada")["isVerifiedPurchase"], json!(true));
        assert_eq!(by("bob")["isVerifiedPurchase"], json!(false));
        assert_eq!(by("ada")["userName"], json!("ada@example.com"));
    }

    #[tokio::test]
    async fn test_helpful_votes_and_bad_input() {
        let app = TestApp::new();
        let mug = app.store.create("products", json!({"name": "Mug", "price": 12.5})).await.unwrap().id;
        let ada = app.login("ada", "customer").await;
        let id = review(&app, &ada, &mug, 4).await;

        app.call(Method::POST, &format!("/api/reviews/{id}/helpful"), None, None).await;
        let (_, body) = app.call(Method::POST, &format!("/api/reviews/{id}/helpful"), None, None).await;
        assert_eq!(body["review"]["helpfulVotes"], json!(2));

        let (status, _) = app
            .call(Method::POST, "/api/reviews", Some(&ada), Some(json!({"productId": mug, "rating": 9})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .call(Method::POST, "/api/reviews", Some(&ada), Some(json!({"productId": "ghost", "rating": 3})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
