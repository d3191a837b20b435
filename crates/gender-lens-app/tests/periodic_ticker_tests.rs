//! Integration tests for ticker cadence on a paused clock.

use std::time::Duration;

use gender_lens_app::PeriodicTicker;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn periodic_ticker_tests_first_tick_after_one_period() {
    let period = Duration::from_millis(7_000);
    let (ticks, mut received) = mpsc::unbounded_channel();
    let started = Instant::now();
    let ticker = PeriodicTicker::spawn(period, move || ticks.send(Instant::now()).is_ok());

    let first = received.recv().await.expect("first tick");
    let second = received.recv().await.expect("second tick");
    let slack = Duration::from_millis(5);
    assert!(first - started >= period && first - started < period + slack);
    assert!(second - first >= period - slack && second - first < period + slack);

    ticker.cancel();
    tokio::time::sleep(period * 3).await;
    assert!(ticker.is_finished());
    assert!(received.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn periodic_ticker_tests_stops_when_callback_declines() {
    let (ticks, mut received) = mpsc::unbounded_channel::<()>();
    let ticker = PeriodicTicker::spawn(Duration::from_secs(1), move || {
        let _ = ticks.send(());
        false
    });

    received.recv().await.expect("single tick");
    assert!(received.recv().await.is_none());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(ticker.is_finished());
}

#[tokio::test(start_paused = true)]
async fn periodic_ticker_tests_drop_cancels() {
    let (ticks, mut received) = mpsc::unbounded_channel::<()>();
    let ticker = PeriodicTicker::spawn(Duration::from_secs(1), move || ticks.send(()).is_ok());
    drop(ticker);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(received.recv().await.is_none());
}
