// ./infrastructure/tests/blog_service.rs
//! BlogService running against the in-memory document store.

use application::{
    ApplicationError, BlogService, CATEGORIES_COLLECTION, CATEGORIES_DOCUMENT_ID, DocumentStore,
    StoreError,
};
use domain::{Fields, PostId};
use infrastructure::InMemoryDocumentStore;
use serde_json::{Value, json};
use std::sync::Arc;

fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("object literal")
}

fn service() -> (Arc<InMemoryDocumentStore>, BlogService) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let service = BlogService::new(store.clone());
    (store, service)
}

#[tokio::test]
async fn added_post_reads_back_with_its_id() {
    let (_, blog) = service();
    let written = fields(json!({
        "title": "Hello",
        "content": "First post",
        "date": "2024-01-01",
        "category": "news"
    }));

    let id = blog.add_post(written.clone()).await.unwrap();
    let post = blog.get_post(&id).await.unwrap().expect("post exists");

    assert_eq!(post.id(), &id);
    assert_eq!(post.fields(), &written);
    assert_eq!(post.title(), Some("Hello"));
}

#[tokio::test]
async fn missing_post_is_none() {
    let (_, blog) = service();
    assert!(blog.get_post(&PostId::from("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn update_merges_and_reads_back() {
    let (_, blog) = service();
    let id = blog
        .add_post(fields(json!({ "title": "Draft", "content": "..." })))
        .await
        .unwrap();

    blog.update_post(&id, fields(json!({ "title": "Final" })))
        .await
        .unwrap();

    let post = blog.get_post(&id).await.unwrap().unwrap();
    assert_eq!(post.fields(), &fields(json!({ "title": "Final", "content": "..." })));
}

#[tokio::test]
async fn delete_removes_and_tolerates_missing() {
    let (_, blog) = service();
    let id = blog.add_post(fields(json!({ "title": "Bye" }))).await.unwrap();

    blog.delete_post(&id).await.unwrap();
    assert!(blog.get_post(&id).await.unwrap().is_none());
    blog.delete_post(&id).await.unwrap();
}

#[tokio::test]
async fn get_all_posts_returns_every_post() {
    let (_, blog) = service();
    for n in 0..3 {
        blog.add_post(fields(json!({ "title": format!("Post {}", n) })))
            .await
            .unwrap();
    }
    assert_eq!(blog.get_all_posts().await.unwrap().len(), 3);
}

#[tokio::test]
async fn categories_are_created_lazily() {
    let (store, blog) = service();
    assert!(
        store
            .get(CATEGORIES_COLLECTION, CATEGORIES_DOCUMENT_ID)
            .await
            .unwrap()
            .is_none()
    );

    assert!(blog.get_all_categories().await.unwrap().is_empty());
    let document = store
        .get(CATEGORIES_COLLECTION, CATEGORIES_DOCUMENT_ID)
        .await
        .unwrap()
        .expect("category document created");
    assert_eq!(document.fields, fields(json!({ "categories": [] })));

    assert!(blog.get_all_categories().await.unwrap().is_empty());
}

#[tokio::test]
async fn add_category_is_idempotent() {
    let (_, blog) = service();
    blog.add_category("rust").await.unwrap();
    blog.add_category("web").await.unwrap();
    blog.add_category("rust").await.unwrap();

    assert_eq!(blog.get_all_categories().await.unwrap(), ["rust", "web"]);
}

#[tokio::test]
async fn delete_category_removes_in_place() {
    let (_, blog) = service();
    for name in ["a", "b", "c"] {
        blog.add_category(name).await.unwrap();
    }

    blog.delete_category("b").await.unwrap();
    assert_eq!(blog.get_all_categories().await.unwrap(), ["a", "c"]);

    blog.delete_category("zzz").await.unwrap();
    assert_eq!(blog.get_all_categories().await.unwrap(), ["a", "c"]);
}

#[tokio::test]
async fn adjacent_posts_follow_dates() {
    let (_, blog) = service();
    let d1 = blog
        .add_post(fields(json!({ "title": "D1", "date": "2024-01-01" })))
        .await
        .unwrap();
    let d2 = blog
        .add_post(fields(json!({ "title": "D2", "date": { "seconds": 1706745600, "nanoseconds": 0 } })))
        .await
        .unwrap();
    let d3 = blog
        .add_post(fields(json!({ "title": "D3", "date": "2024-03-01T12:00:00Z" })))
        .await
        .unwrap();

    let middle = blog.get_adjacent_posts(&d2).await.unwrap();
    assert_eq!(middle.prev.as_ref().map(|p| p.id()), Some(&d1));
    assert_eq!(middle.next.as_ref().map(|p| p.id()), Some(&d3));

    let newest = blog.get_adjacent_posts(&d3).await.unwrap();
    assert_eq!(newest.prev.as_ref().map(|p| p.id()), Some(&d2));
    assert!(newest.next.is_none());

    let oldest = blog.get_adjacent_posts(&d1).await.unwrap();
    assert!(oldest.prev.is_none());
    assert_eq!(oldest.next.as_ref().map(|p| p.id()), Some(&d2));

    let unknown = blog
        .get_adjacent_posts(&PostId::from("unknown-id"))
        .await
        .unwrap();
    assert!(unknown.prev.is_none() && unknown.next.is_none());
}

#[tokio::test]
async fn adjacent_posts_on_empty_store() {
    let (_, blog) = service();
    let adjacent = blog.get_adjacent_posts(&PostId::from("any")).await.unwrap();
    assert!(adjacent.prev.is_none() && adjacent.next.is_none());
}

#[tokio::test]
async fn offline_store_surfaces_store_errors() {
    let (store, blog) = service();
    store.set_available(false);

    let err = blog.get_post(&PostId::from("p")).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Store(StoreError::Unavailable(_))));
    assert!(blog.add_category("rust").await.is_err());
}
