use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;

use super::*;
use crate::{RollController, RollError};

fn start_session(
    config: DiceConfiguration,
    mode: RollMode,
    roller: impl Roller + 'static,
) -> (SessionHandle, UnboundedReceiver<RollEvent>) {
    let (observer, rx) = ChannelObserver::channel();
    let session = RollSession::new(config, mode, Box::new(roller), Arc::new(observer)).unwrap();
    assert_eq!(session.get_state(), SessionState::Idle);
    (session.start(), rx)
}

async fn drain(rx: &mut UnboundedReceiver<RollEvent>) -> (Vec<Tick>, Vec<Termination>) {
    let mut ticks = vec![];
    let mut terminations = vec![];
    while let Some(event) = rx.recv().await {
        match event {
            RollEvent::Tick(tick) => ticks.push(tick),
            RollEvent::Terminated(t) => terminations.push(t),
        }
    }
    (ticks, terminations)
}

#[tokio::test(start_paused = true)]
async fn test_fixed_sequence_scenario() {
    let config = DiceConfiguration::new(6, 2).unwrap();
    let roller = SequenceRoller::new(vec![3, 5, 1, 1, 6, 2]);
    let (handle, mut rx) = start_session(config, RollMode::Bounded(3), roller);

    let (ticks, terminations) = drain(&mut rx).await;

    let results: Vec<Vec<u32>> = ticks.iter().map(|t| t.result.values().to_vec()).collect();
    assert_eq!(results, vec![vec![3, 5], vec![1, 1], vec![6, 2]]);
    assert_eq!(ticks.iter().map(|t| t.terminal).collect::<Vec<_>>(), vec![false, false, true]);
    assert_eq!(ticks.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2, 3]);

    assert_eq!(handle.get_state(), SessionState::Terminated);
    assert_eq!(handle.buffer().read(), Some(RollResult::new(vec![6, 2])));
    assert_eq!(terminations.len(), 1);
    assert_eq!(terminations[0].reason, TerminationReason::Exhausted);
    assert_eq!(terminations[0].ticks, 3);
    assert_eq!(terminations[0].last, Some(RollResult::new(vec![6, 2])));
}

#[tokio::test(start_paused = true)]
async fn test_single_roll_emits_exactly_25_ticks() {
    let config = DiceConfiguration::new(20, 3).unwrap();
    let (handle, mut rx) = start_session(config, RollMode::single(), RandomDiceSource::seeded(42));

    let (ticks, terminations) = drain(&mut rx).await;

    assert_eq!(ticks.len(), 25);
    assert!(ticks[..24].iter().all(|t| !t.terminal));
    assert!(ticks[24].terminal);
    assert_eq!(terminations.len(), 1);
    assert_eq!(handle.get_state(), SessionState::Terminated);

    // Nothing else arrives once terminated
    time::sleep(TICK_INTERVAL * 10).await;
    assert_eq!(handle.buffer().read(), Some(ticks[24].result.clone()));
}

#[tokio::test(start_paused = true)]
async fn test_every_result_fits_configuration() {
    for (faces, dice) in [(2, 1), (6, 2), (13, 7), (144, 15)] {
        let config = DiceConfiguration::new(faces, dice).unwrap();
        let (_, mut rx) = start_session(config, RollMode::Bounded(40), RandomDiceSource::new());

        let (ticks, _) = drain(&mut rx).await;
        assert_eq!(ticks.len(), 40);
        for tick in ticks {
            assert_eq!(tick.result.len(), dice as usize);
            assert!(tick.result.values().iter().all(|v| (1..=faces).contains(v)));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_ticks_follow_the_fixed_cadence() {
    let config = DiceConfiguration::new(6, 1).unwrap();
    let started = time::Instant::now();
    let (handle, mut rx) = start_session(config, RollMode::Bounded(5), SequenceRoller::new(vec![4]));

    drain(&mut rx).await;
    handle.wait().await;

    // First tick fires immediately, then one per interval
    assert_eq!(started.elapsed(), TICK_INTERVAL * 4);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_session_runs_until_stopped() {
    let config = DiceConfiguration::new(6, 2).unwrap();
    let (handle, mut rx) = start_session(config, RollMode::Continuous, RandomDiceSource::new());

    let mut before_stop = 0;
    while before_stop < 100 {
        match rx.recv().await {
            Some(RollEvent::Tick(tick)) => {
                assert!(!tick.terminal);
                before_stop += 1;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(handle.get_state(), SessionState::Running);

    handle.stop().await;
    assert_eq!(handle.get_state(), SessionState::Terminated);

    let (after_stop, terminations) = drain(&mut rx).await;
    assert!(after_stop.len() <= 1, "got {} ticks after stop", after_stop.len());
    assert_eq!(terminations.len(), 1);
    assert_eq!(terminations[0].reason, TerminationReason::Cancelled);
    assert_eq!(terminations[0].ticks as usize, before_stop + after_stop.len());
}

/// Requests a stop from inside the observer, i.e. while a tick is in flight.
struct StopOnTick {
    stop_at: u32,
    handle: Mutex<Option<SessionHandle>>,
    ticks: AtomicU32,
    terminal_seen: AtomicU32,
}

struct StopOnTickObserver(Arc<StopOnTick>);

impl TickObserver for StopOnTickObserver {
    fn on_tick(&self, tick: &Tick) {
        let this = &self.0;
        this.ticks.fetch_add(1, Ordering::SeqCst);
        if tick.terminal {
            this.terminal_seen.fetch_add(1, Ordering::SeqCst);
        }
        if tick.index == this.stop_at {
            if let Some(handle) = this.handle.lock().unwrap().as_ref() {
                assert!(handle.request_stop());
                assert_eq!(handle.get_state(), SessionState::Stopping);
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_tick_completes_in_flight_tick_only() {
    let observer = Arc::new(StopOnTick {
        stop_at: 3,
        handle: Mutex::new(None),
        ticks: AtomicU32::new(0),
        terminal_seen: AtomicU32::new(0),
    });
    let config = DiceConfiguration::new(6, 2).unwrap();
    let session = RollSession::new(
        config,
        RollMode::Continuous,
        Box::new(RandomDiceSource::seeded(1)),
        Arc::new(StopOnTickObserver(observer.clone())),
    )
    .unwrap();
    let handle = session.start();
    *observer.handle.lock().unwrap() = Some(handle.clone());

    handle.wait().await;

    // The tick that requested the stop was already published; no tick follows
    assert_eq!(observer.ticks.load(Ordering::SeqCst), 3);
    assert_eq!(observer.terminal_seen.load(Ordering::SeqCst), 0);
    assert!(handle.buffer().read().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_flags_terminal_when_seen_before_notify() {
    let config = DiceConfiguration::new(6, 1).unwrap();
    let stopper: Arc<Mutex<Option<SessionHandle>>> = Arc::new(Mutex::new(None));

    // Stops from inside the roller, so the in-flight tick sees Stopping
    struct StoppingRoller {
        rolls: u32,
        handle: Arc<Mutex<Option<SessionHandle>>>,
    }
    impl Roller for StoppingRoller {
        fn roll_in_range(&mut self, _max: u32) -> u32 {
            self.rolls += 1;
            if self.rolls == 2 {
                if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                    handle.request_stop();
                }
            }
            self.rolls
        }
    }

    let roller = StoppingRoller {
        rolls: 0,
        handle: stopper.clone(),
    };
    let (handle, mut rx) = start_session(config, RollMode::Continuous, roller);
    *stopper.lock().unwrap() = Some(handle.clone());

    let (ticks, terminations) = drain(&mut rx).await;
    assert_eq!(ticks.len(), 2);
    assert!(!ticks[0].terminal);
    assert!(ticks[1].terminal);
    assert_eq!(handle.buffer().read(), Some(RollResult::new(vec![2])));
    assert_eq!(terminations[0].reason, TerminationReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_session_can_be_cut_short() {
    let config = DiceConfiguration::new(6, 2).unwrap();
    let (handle, mut rx) = start_session(config, RollMode::Bounded(1000), RandomDiceSource::new());

    for _ in 0..3 {
        assert!(matches!(rx.recv().await, Some(RollEvent::Tick(_))));
    }
    handle.stop().await;

    let (rest, terminations) = drain(&mut rx).await;
    assert!(rest.len() <= 1);
    assert_eq!(terminations[0].reason, TerminationReason::Cancelled);
    assert!(terminations[0].ticks < 1000);
}

#[tokio::test(start_paused = true)]
async fn test_stop_on_terminated_session_is_noop() {
    let config = DiceConfiguration::new(4, 1).unwrap();
    let (handle, mut rx) = start_session(config, RollMode::Bounded(2), SequenceRoller::new(vec![1, 2]));
    handle.wait().await;

    assert!(!handle.request_stop());
    handle.stop().await;
    handle.stop().await;
    assert_eq!(handle.get_state(), SessionState::Terminated);

    let (ticks, terminations) = drain(&mut rx).await;
    assert_eq!(ticks.len(), 2);
    assert_eq!(terminations.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_start_never_writes_a_buffer() {
    let writes = Arc::new(AtomicU32::new(0));
    let controller = {
        let writes = writes.clone();
        RollController::with_roller(move || {
            writes.fetch_add(1, Ordering::SeqCst);
            Box::new(RandomDiceSource::new())
        })
    };

    for selection in [
        DiceSelection { faces: None, dice: Some(2) },
        DiceSelection { faces: Some(6), dice: None },
        DiceSelection::new(1, 2),
        DiceSelection::new(6, 0),
    ] {
        let result = controller.start(selection, RollMode::single(), |_: &Tick| {});
        assert!(matches!(result, Err(RollError::Configuration(_))));
    }

    assert!(controller.active().is_none());
    assert_eq!(writes.load(Ordering::SeqCst), 0);
}

/// Shows the same face on every die of a tick, cycling through 1..=faces.
struct UniformRoller {
    faces: u32,
    current: u32,
}

impl Roller for UniformRoller {
    fn roll_in_range(&mut self, _max: u32) -> u32 {
        self.current
    }

    fn roll(&mut self, config: &DiceConfiguration) -> RollResult {
        self.current = self.current % self.faces + 1;
        RollResult::new(vec![self.current; config.get_dice() as usize])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_presentation_reads_while_session_writes() {
    let config = DiceConfiguration::new(8, 12).unwrap();
    let registered: Arc<OnceLock<Arc<ResultBuffer>>> = Arc::new(OnceLock::new());
    let notified = Arc::new(AtomicU32::new(0));

    let observer = {
        let registered = registered.clone();
        let notified = notified.clone();
        move |tick: &Tick| {
            // The buffer already holds this tick when the observer hears of it
            let buffer = registered.get().expect("buffer registered before start");
            assert_eq!(buffer.read().as_ref(), Some(&tick.result));
            notified.fetch_add(1, Ordering::SeqCst);
        }
    };
    let roller = UniformRoller { faces: 8, current: 0 };
    let session = RollSession::new(config, RollMode::Bounded(30), Box::new(roller), Arc::new(observer)).unwrap();
    registered.set(session.buffer()).unwrap();
    let handle = session.start();

    let reader = {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut reads = 0u32;
            while !handle.has_exited() {
                if let Some(seen) = handle.buffer().read() {
                    assert!(config.admits(&seen), "inadmissible read {seen}");
                    let first = seen.values()[0];
                    assert!(seen.values().iter().all(|&v| v == first), "torn read {seen}");
                    reads += 1;
                }
                tokio::task::yield_now().await;
            }
            reads
        })
    };

    handle.wait().await;
    let reads = reader.await.unwrap();
    assert!(reads > 0);
    assert_eq!(notified.load(Ordering::SeqCst), 30);
    // Tick 30 shows face ((30 - 1) % 8) + 1
    assert_eq!(handle.buffer().read().map(|r| r.values()[0]), Some(6));
}

struct FailingRoller;

impl Roller for FailingRoller {
    fn roll_in_range(&mut self, _max: u32) -> u32 {
        panic!("dice source failed");
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_roller_aborts_session() {
    let config = DiceConfiguration::new(6, 2).unwrap();
    let (handle, mut rx) = start_session(config, RollMode::Continuous, FailingRoller);

    let (ticks, terminations) = drain(&mut rx).await;
    handle.wait().await;

    assert!(ticks.is_empty());
    assert_eq!(terminations.len(), 1);
    assert_eq!(terminations[0].reason, TerminationReason::Aborted);
    assert_eq!(terminations[0].ticks, 0);
    assert_eq!(terminations[0].last, None);
    assert!(handle.buffer().is_empty());
    assert_eq!(handle.get_state(), SessionState::Terminated);
}
