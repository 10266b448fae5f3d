//! Request level entry points on top of the [`Arbiter`], plus the cyclic capture
//! scheduler used by the watch front-end.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use scopeguard::guard;

use crate::{
    arbiter::{AcquirePolicy, Arbiter, Connector},
    error::Result,
    flags::MeterField,
    link::ProgressSink,
    raster::Screenshot,
    response::{Identity, Measurement, Status},
    scope::{CaptureRequest, ScopeMeter},
};

/// One lease per call: acquire, connect if needed, run, release
pub struct CaptureSession<'a, C: Connector> {
    arbiter: &'a Arbiter<C>,
    policy: AcquirePolicy,
}

impl<'a, C: Connector> CaptureSession<'a, C> {
    pub fn new(arbiter: &'a Arbiter<C>, policy: AcquirePolicy) -> Self {
        CaptureSession { arbiter, policy }
    }

    fn run<T>(&self, op: impl FnOnce(&mut ScopeMeter<C::Io>) -> Result<T>) -> Result<T> {
        let mut lease = self.arbiter.acquire(self.policy)?;
        lease.with_device(op)
    }

    pub fn identify(&self) -> Result<Identity> {
        self.run(|scope| scope.identify())
    }

    pub fn idn(&self) -> Result<String> {
        self.run(|scope| scope.idn())
    }

    pub fn measure(&self, field: MeterField) -> Result<f64> {
        self.run(|scope| scope.query_measurement(field))
    }

    pub fn measure_detail(&self, field: MeterField) -> Result<Measurement> {
        self.run(|scope| scope.query_measurement_detail(field))
    }

    pub fn status(&self) -> Result<Status> {
        self.run(|scope| scope.status())
    }

    pub fn capture(
        &self,
        req: &CaptureRequest,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Screenshot> {
        self.run(|scope| scope.capture_screen(req, progress))
    }

    /// Holds the lease for the whole wait, other requests get [`crate::Error::Busy`]
    /// or queue up depending on their policy
    pub fn await_print(
        &self,
        req: &CaptureRequest,
        wait: Duration,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Screenshot> {
        self.run(|scope| scope.await_print(req, wait, progress))
    }
}

/// Overlap guard for front-ends that trigger captures from timers or buttons
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        InFlight::default()
    }

    /// `None` while an earlier token is alive
    pub fn try_begin(&self) -> Option<InFlightToken> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightToken(self.0.clone()))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct InFlightToken(Arc<AtomicBool>);

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs a capture job every `interval` on a worker thread. A tick that finds the
/// previous job still running is skipped.
pub struct CyclicCapture {
    stop: mpsc::Sender<()>,
    scheduler: Option<JoinHandle<()>>,
}

impl CyclicCapture {
    /// The first job starts immediately. With `stop_on_error` the first failed job
    /// ends the cycle after its result was delivered.
    pub fn start<T, J, R>(interval: Duration, stop_on_error: bool, job: J, on_result: R) -> Self
    where
        T: Send + 'static,
        J: FnMut() -> Result<T> + Send + 'static,
        R: FnMut(Result<T>) + Send + 'static,
    {
        let (stop, stop_rx) = mpsc::channel();
        let worker_stop = stop.clone();
        let job = Arc::new(Mutex::new((job, on_result)));
        // Set before the failed job's token is released
        let halted = Arc::new(AtomicBool::new(false));

        let scheduler = thread::spawn(move || {
            let in_flight = InFlight::new();
            // Never leave a capture running behind the caller's back
            let mut worker = guard(None::<JoinHandle<()>>, |worker| {
                if let Some(worker) = worker {
                    let _ = worker.join();
                }
                log::debug!("Cyclic capture stopped");
            });
            loop {
                match in_flight.try_begin() {
                    Some(_) if halted.load(Ordering::Acquire) => break,
                    Some(token) => {
                        let job = job.clone();
                        let stop = worker_stop.clone();
                        let halted = halted.clone();
                        let handle = thread::spawn(move || {
                            let _token = token;
                            let mut job = match job.lock() {
                                Ok(job) => job,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            let (run, on_result) = &mut *job;
                            let result = run();
                            let failed = result.is_err();
                            on_result(result);
                            if failed && stop_on_error {
                                log::info!("Capture failed, stopping cycle");
                                halted.store(true, Ordering::Release);
                                let _ = stop.send(());
                            }
                        });
                        if let Some(previous) = worker.replace(handle) {
                            let _ = previous.join();
                        }
                    }
                    None => log::debug!("Previous capture still running, skipping tick"),
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        CyclicCapture {
            stop,
            scheduler: Some(scheduler),
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .map_or(false, |scheduler| !scheduler.is_finished())
    }

    /// Blocks until a job in progress has finished
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Waits for the cycle to end on its own, e.g. after a failure with `stop_on_error`
    pub fn join(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            let _ = scheduler.join();
        }
    }

    fn shutdown(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            let _ = self.stop.send(());
            let _ = scheduler.join();
        }
    }
}

impl Drop for CyclicCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}
