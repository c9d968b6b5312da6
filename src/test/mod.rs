//! Test sequencing: cases, the shared measurement primitives and the run loop.


use std::time::Duration;

use log::warn;

pub use analog::AnalogCase;
pub use case::{Rig, TestBody, TestCase, TestState};
pub use runner::{RunSummary, StopHandle, TestManager};
pub use suite::{ConnectionCase, standard_suite};
pub use test_config::{
    AnalogConfig, Band, MAX_LEVEL_PCT, MIN_LEVEL_PCT, RejectionCheck, SearchParams,
};

use crate::connection::{ConnectionManager, SharedConnection};
use crate::device::{Receiver, Stand};
use crate::proto::FrameCodec;
use crate::sim::Bench;

impl Rig {
    /// Open both links and wrap them in device facades.
    pub fn connect(mut receiver: ConnectionManager, mut stand: ConnectionManager) -> Self {
        for link in [&mut receiver, &mut stand] {
            if !link.open() {
                warn!("[{}] link did not open", link.name());
            }
        }
        Self {
            receiver: Receiver::new(SharedConnection::new(receiver)),
            stand: Stand::new(SharedConnection::new(stand)),
        }
    }

    /// A rig wired to the simulated bench.
    pub fn simulated(bench: &Bench, codec: FrameCodec, timeout: Duration) -> Self {
        Self::connect(
            ConnectionManager::new("receiver", Box::new(bench.receiver_transport(codec)), codec)
                .with_timeout(timeout),
            ConnectionManager::new("stand", Box::new(bench.stand_transport(codec)), codec)
                .with_timeout(timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LinkError, TestError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        set_up: AtomicUsize,
        run: AtomicUsize,
        tear_down: AtomicUsize,
    }

    struct Scripted {
        calls: Arc<Calls>,
        set_up: fn() -> Result<bool, TestError>,
        run: fn() -> Result<(), TestError>,
        on_run: Option<StopHandle>,
    }

    impl Scripted {
        fn passing(calls: Arc<Calls>) -> Self {
            Self {
                calls,
                set_up: || Ok(true),
                run: || Ok(()),
                on_run: None,
            }
        }
    }

    impl TestBody for Scripted {
        fn set_up(&mut self, _rig: &mut Rig) -> Result<bool, TestError> {
            self.calls.set_up.fetch_add(1, Ordering::SeqCst);
            (self.set_up)()
        }
        fn run_test(&mut self, _rig: &mut Rig) -> Result<(), TestError> {
            self.calls.run.fetch_add(1, Ordering::SeqCst);
            if let Some(stop) = &self.on_run {
                stop.stop();
            }
            (self.run)()
        }
        fn tear_down(&mut self, _rig: &mut Rig) {
            self.calls.tear_down.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sim_rig() -> (Bench, Rig) {
        let _ = env_logger::builder().is_test(true).try_init();
        let bench = Bench::default();
        let rig = Rig::simulated(&bench, FrameCodec::default(), Duration::from_millis(100));
        (bench, rig)
    }

    fn fast_suite() -> Vec<TestCase> {
        standard_suite(Duration::ZERO)
    }

    #[test]
    fn disabled_case_is_skipped_without_running() {
        let (_bench, mut rig) = sim_rig();
        let a = Arc::new(Calls::default());
        let b = Arc::new(Calls::default());
        let c = Arc::new(Calls::default());
        let mut mgr = TestManager::new(vec![
            TestCase::new(1, "A", Scripted::passing(a.clone())),
            TestCase::new(2, "B", Scripted::passing(b.clone())).disabled(),
            TestCase::new(3, "C", Scripted::passing(c.clone())),
        ]);

        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(&1), Some(&TestState::Pass));
        assert_eq!(results.get(&3), Some(&TestState::Pass));
        assert!(!results.contains_key(&2));
        assert_eq!(mgr.test_list()[1].state(), TestState::Skip);
        assert_eq!(b.set_up.load(Ordering::SeqCst), 0);
        assert_eq!(b.run.load(Ordering::SeqCst), 0);
        assert_eq!(a.run.load(Ordering::SeqCst), 1);
        assert_eq!(c.run.load(Ordering::SeqCst), 1);
        assert!(!mgr.is_running());
    }

    #[test]
    fn failures_are_isolated_per_case() {
        let (_bench, mut rig) = sim_rig();
        let calls = Arc::new(Calls::default());
        let mut mgr = TestManager::new(vec![
            TestCase::new(
                1,
                "assert",
                Scripted {
                    run: || Err(TestError::assertion("level low")),
                    ..Scripted::passing(calls.clone())
                },
            ),
            TestCase::new(
                2,
                "device",
                Scripted {
                    run: || Err(TestError::Device(LinkError::Timeout(Duration::from_millis(1)))),
                    ..Scripted::passing(calls.clone())
                },
            ),
            TestCase::new(
                3,
                "not ready",
                Scripted {
                    set_up: || Ok(false),
                    ..Scripted::passing(calls.clone())
                },
            ),
            TestCase::new(4, "ok", Scripted::passing(calls.clone())),
        ]);

        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results[&1], TestState::Fail);
        assert_eq!(results[&2], TestState::Abort);
        assert_eq!(results[&3], TestState::Skip);
        assert_eq!(results[&4], TestState::Pass);
        // set_up(false) means run_test is never called
        assert_eq!(calls.run.load(Ordering::SeqCst), 3);
        assert_eq!(calls.tear_down.load(Ordering::SeqCst), 4);
        assert_eq!(mgr.test_list()[0].detail(), Some("assertion failed: level low"));

        let summary = mgr.summary();
        assert_eq!((summary.pass, summary.fail, summary.abort, summary.skip), (1, 1, 1, 1));
        assert!(summary.has_failures());
    }

    #[test]
    fn set_up_outcomes_follow_state_machine() {
        let (_bench, mut rig) = sim_rig();
        let calls = Arc::new(Calls::default());
        let mut declined = TestCase::new(
            1,
            "declined",
            Scripted {
                set_up: || Ok(false),
                ..Scripted::passing(calls.clone())
            },
        );
        let mut broken = TestCase::new(
            2,
            "broken",
            Scripted {
                set_up: || Err(TestError::assertion("no stand")),
                ..Scripted::passing(calls.clone())
            },
        );
        // execute asserts every transition it takes in debug builds
        assert_eq!(declined.execute(&mut rig), TestState::Skip);
        assert_eq!(declined.detail(), None);
        assert_eq!(broken.execute(&mut rig), TestState::Fail);
        assert_eq!(broken.detail(), Some("assertion failed: no stand"));
        assert_eq!(calls.run.load(Ordering::SeqCst), 0);
        assert_eq!(calls.tear_down.load(Ordering::SeqCst), 2);

        declined.reset();
        assert_eq!(declined.state(), TestState::Ready);
    }

    #[test]
    fn receiver_reports_input_magnitudes() {
        let (bench, rig) = sim_rig();
        {
            let mut st = bench.state();
            st.output_on = true;
            st.frequency_hz = 0;
            st.voltage_mv = 1000;
        }
        assert_eq!(rig.receiver.magnitudes().unwrap(), [1000, 980, 1020, 990]);
    }

    #[test]
    fn stop_is_observed_between_cases() {
        let (_bench, mut rig) = sim_rig();
        let calls = Arc::new(Calls::default());
        let mut mgr = TestManager::new(Vec::new());
        let stop = mgr.stop_handle();
        mgr.add_case(TestCase::new(1, "first", Scripted::passing(calls.clone())));
        mgr.add_case(TestCase::new(
            2,
            "stops",
            Scripted {
                on_run: Some(stop.clone()),
                ..Scripted::passing(calls.clone())
            },
        ));
        mgr.add_case(TestCase::new(3, "never", Scripted::passing(calls.clone())));

        let results = mgr.start_tests(&mut rig).clone();
        // the stopping case itself still completes
        assert_eq!(results[&2], TestState::Pass);
        assert!(!results.contains_key(&3));
        assert_eq!(mgr.test_list()[2].state(), TestState::Ready);
        assert_eq!(mgr.summary().not_run, 1);

        // a new run clears the stop request and rebuilds the results
        mgr.set_enabled(2, false);
        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn standard_suite_passes_on_simulated_bench() {
        let (_bench, mut rig) = sim_rig();
        let mut mgr = TestManager::new(fast_suite());
        let results = mgr.start_tests(&mut rig).clone();
        for (id, state) in &results {
            assert_eq!(*state, TestState::Pass, "case {} {:?}", id, mgr.test_list());
        }
        assert_eq!(results.len(), 4);
        assert_eq!(rig.receiver.info().unwrap().model, "RX-4");
        assert!(!mgr.summary().has_failures());
    }

    #[test]
    fn dead_channel_fails_search() {
        let (bench, mut rig) = sim_rig();
        bench.state().channel_gain[3] = 0.0;
        let mut mgr = TestManager::new(fast_suite());
        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results[&1], TestState::Pass);
        assert_eq!(results[&2], TestState::Fail);
        assert_eq!(results[&3], TestState::Fail);
    }

    #[test]
    fn weak_filter_fails_rejection_only() {
        let (bench, mut rig) = sim_rig();
        // higher corner: the stop band leaks through
        bench.state().cutoff_hz = 3000.0;
        let mut mgr = TestManager::new(fast_suite());
        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results[&2], TestState::Pass);
        assert_eq!(results[&3], TestState::Fail);
        assert_eq!(results[&4], TestState::Fail);
    }

    #[test]
    fn offline_device_skips_analog_cases() {
        let (bench, mut rig) = sim_rig();
        bench.state().stand_online = false;
        let mut mgr = TestManager::new(fast_suite());
        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results[&1], TestState::Fail);
        assert_eq!(results[&2], TestState::Skip);
    }

    /// Receiver disappears once the rig has been prepared.
    struct Unplug(Bench, AnalogCase);

    impl TestBody for Unplug {
        fn set_up(&mut self, rig: &mut Rig) -> Result<bool, TestError> {
            let ready = self.1.set_up(rig)?;
            self.0.state().receiver_online = false;
            Ok(ready)
        }
        fn run_test(&mut self, rig: &mut Rig) -> Result<(), TestError> {
            self.1.run_test(rig)
        }
        fn tear_down(&mut self, rig: &mut Rig) {
            self.1.tear_down(rig)
        }
    }

    #[test]
    fn device_dropping_mid_case_aborts() {
        let (bench, mut rig) = sim_rig();
        let calls = Arc::new(Calls::default());
        let body = AnalogCase::new(AnalogConfig {
            search: SearchParams {
                settle: Duration::ZERO,
                ..SearchParams::default()
            },
            ..AnalogConfig::default()
        });
        let mut mgr = TestManager::new(vec![
            TestCase::new(1, "unplugged", Unplug(bench.clone(), body)),
            TestCase::new(2, "after", Scripted::passing(calls.clone())),
        ]);
        let results = mgr.start_tests(&mut rig).clone();
        assert_eq!(results[&1], TestState::Abort);
        assert_eq!(results[&2], TestState::Pass);
        assert!(mgr.test_list()[0].detail().unwrap().starts_with("device error"));
        // the generator is switched off again after the abort
        assert!(!bench.state().output_on);
    }
}
