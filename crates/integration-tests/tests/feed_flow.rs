//! Feed, favorites and viewer wired together over a mocked feed client.

use mockall::predicate::function;
use rg_core::{
    FavoritesLedger, FeedOptions, GalleryFeed, MockFeedClient, PageQuery, RawFeedResponse,
    RawId, RawImage, RetryPolicy, RetryingFetcher, SortOrder, Storage, ViewerController,
};
use std::sync::Arc;
use std::time::Duration;

const PAGE_SIZE: u32 = 4;

fn raw_page(query: &PageQuery, total: u64) -> RawFeedResponse {
    let start = u64::from(query.page * query.page_size);
    let end = (start + u64::from(query.page_size)).min(total);
    RawFeedResponse {
        items: (start..end)
            .map(|id| RawImage {
                id: RawId::Number(id),
                img_url: format!("https://img.example/{id}.jpg"),
                thumbnail_url: None,
                width: None,
                height: None,
                created_at: None,
                size: Some(1000 + id),
            })
            .collect(),
        total_count: Some(total),
    }
}

fn gallery(client: MockFeedClient) -> GalleryFeed {
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
    };
    let fetcher = Arc::new(RetryingFetcher::new(Arc::new(client), policy));
    let options = FeedOptions {
        page_size: PAGE_SIZE,
        order_by: 2,
    };
    GalleryFeed::new(fetcher, options, SortOrder::DateDesc)
}

#[tokio::test]
async fn pages_until_the_end_then_views_and_favorites() {
    let mut client = MockFeedClient::new();
    client
        .expect_fetch_page()
        .with(function(|q: &PageQuery| q.order_by == 2 && !q.order_ascending))
        .times(3)
        .returning(|query| Ok(raw_page(query, 10)));

    let feed = gallery(client);
    feed.refresh_images().await;
    feed.load_more_images().await;
    feed.load_more_images().await;
    // Past the end: no further request
    feed.load_more_images().await;

    let state = feed.snapshot();
    assert_eq!(state.images.len(), 10);
    assert!(state.has_reached_end);
    assert_eq!(state.images[9].width, 1080);

    let favorites = FavoritesLedger::new(Storage::in_memory());
    favorites.load().await;
    favorites.add(&state.images[3]).await.unwrap();
    let items = feed.with_favorites(&favorites);
    assert_eq!(items.iter().filter(|item| item.is_favorite).count(), 1);
    assert!(items[3].is_favorite);

    let mut viewer = ViewerController::open(state.images.clone(), 9, 5);
    assert_eq!(viewer.position_label(), "10 / 10");
    let window = viewer.window().unwrap();
    assert_eq!(window.original_indices(), vec![5, 6, 7, 8, 9]);

    let update = viewer.go_to_previous().unwrap();
    assert_eq!(viewer.acknowledge(update.revision), Some(3));
}

#[tokio::test]
async fn sort_change_restarts_from_page_zero() {
    let mut client = MockFeedClient::new();
    client
        .expect_fetch_page()
        .times(2)
        .returning(|query| Ok(raw_page(query, 10)));

    let feed = gallery(client);
    feed.refresh_images().await;
    feed.set_sort_order(SortOrder::DateAsc).await;

    let state = feed.snapshot();
    assert_eq!(state.sort_order, SortOrder::DateAsc);
    assert_eq!(state.current_page, 1);
    assert_eq!(state.images.len(), PAGE_SIZE as usize);
}
