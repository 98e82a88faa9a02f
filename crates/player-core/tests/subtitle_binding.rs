mod common;

use common::{FakeEngine, HELLO_SRT};
use player_core::subtitle::{LoadOutcome, SubtitleBinder};
use player_core::{FetchError, TrackMode};
use player_proto::protocol::{Locator, SubtitleTrack};

fn track(label: &str) -> SubtitleTrack {
    SubtitleTrack {
        locator: Locator::Remote(format!("https://subs.example/{}", label)),
        label: label.to_string(),
    }
}

#[tokio::test]
async fn test_failed_fetch_disables_track() {
    let engine = FakeEngine::new();
    let mut binder = SubtitleBinder::new();

    let fetch = binder
        .rebind(engine.as_ref(), Some(&track("en.srt")), 0.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(engine.showing_tracks(), vec![fetch.track]);

    let outcome = binder
        .apply_loaded(
            engine.as_ref(),
            fetch.generation,
            fetch.track,
            Err(FetchError::Unsupported("ftp://nope".into())),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, LoadOutcome::Failed(_)));
    assert!(!binder.is_rendering());
    assert_eq!(engine.track(fetch.track).unwrap().mode, TrackMode::Disabled);
}

#[tokio::test]
async fn test_only_one_track_shows_after_rebinds() {
    let engine = FakeEngine::new();
    let mut binder = SubtitleBinder::new();

    let first = binder
        .rebind(engine.as_ref(), Some(&track("a.srt")), 0.0)
        .await
        .unwrap()
        .unwrap();
    let second = binder
        .rebind(engine.as_ref(), Some(&track("b.srt")), 0.0)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(engine.showing_tracks(), vec![second.track]);

    // content for the first bind arrives late
    let outcome = binder
        .apply_loaded(engine.as_ref(), first.generation, first.track, Ok(HELLO_SRT.into()))
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Stale);
    assert!(engine.track(first.track).unwrap().cues.is_empty());

    let outcome = binder
        .apply_loaded(engine.as_ref(), second.generation, second.track, Ok(HELLO_SRT.into()))
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Rendered(1));
    assert_eq!(engine.track(second.track).unwrap().cues.len(), 1);
}

#[tokio::test]
async fn test_negative_offset_shifts_cues_earlier() {
    let engine = FakeEngine::new();
    let mut binder = SubtitleBinder::new();

    let fetch = binder
        .rebind(engine.as_ref(), Some(&track("a.srt")), -0.5)
        .await
        .unwrap()
        .unwrap();
    binder
        .apply_loaded(engine.as_ref(), fetch.generation, fetch.track, Ok(HELLO_SRT.into()))
        .await
        .unwrap();

    assert_eq!(
        engine.track(fetch.track).unwrap().cues,
        vec![(0.5, 3.0, "Hello".to_string())]
    );
}

#[tokio::test]
async fn test_release_disables_everything() {
    let engine = FakeEngine::new();
    let mut binder = SubtitleBinder::new();
    binder
        .rebind(engine.as_ref(), Some(&track("a.srt")), 0.0)
        .await
        .unwrap();

    binder.release(engine.as_ref()).await;

    assert!(engine.showing_tracks().is_empty());
    assert_eq!(binder.rebind(engine.as_ref(), None, 0.0).await.unwrap().map(|f| f.track), None);
}
