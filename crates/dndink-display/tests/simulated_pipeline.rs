//! Render requests through the throttler into PNG files.

use std::path::Path;
use std::time::Duration;

use dndink_core::{ObservedState, RenderRequest};
use dndink_display::driver::{BLACK_FILE, RED_FILE};
use dndink_display::{DisplayDriver, RenderThrottler, Renderer, SimulatedDisplay};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn wait_for_file(path: &Path) {
    for _ in 0..500 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never appeared", path.display());
}

#[tokio::test]
async fn busy_request_produces_red_glyph_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut display = SimulatedDisplay::new(dir.path());
    display.initialize().unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let throttler = RenderThrottler::new(
        Duration::from_secs(10),
        Renderer::default(),
        Box::new(display),
        rx,
    );
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(throttler.run(shutdown.clone()));

    tx.send(RenderRequest::resync(Some(ObservedState::Busy))).unwrap();
    wait_for_file(&dir.path().join(RED_FILE)).await;
    wait_for_file(&dir.path().join(BLACK_FILE)).await;

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let red = image::open(dir.path().join(RED_FILE)).unwrap().to_luma8();
    assert_eq!(red.get_pixel(400, 220).0, [0], "bar centre is red");
    assert_eq!(red.get_pixel(400, 120).0, [255], "gap inside ring is white");

    let black = image::open(dir.path().join(BLACK_FILE)).unwrap().to_luma8();
    let timestamp_ink = (450..470)
        .flat_map(|y| (10..260).map(move |x| (x, y)))
        .filter(|&(x, y)| black.get_pixel(x, y).0 == [0])
        .count();
    assert!(timestamp_ink > 0);
}
