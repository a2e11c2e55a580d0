use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::error::{ClassificationError, StartupError};
use crate::model::Classifier;
use crate::preprocess::NormalizedImage;

type Reply = Result<Vec<f64>, ClassificationError>;

/// How often a submitter retries a full queue while a timeout is running.
const SUBMIT_POLL: Duration = Duration::from_millis(2);

struct Job {
    image: NormalizedImage,
    reply: mpsc::Sender<Reply>,
}

/// Fixed set of threads that run the blocking model call.
///
/// Request threads hand a [`NormalizedImage`] to [`InferencePool::infer`]
/// and sleep on a one-shot channel until a worker answers. The job queue is
/// bounded; when it is full, submitters block until a slot frees up or,
/// when a timeout is set, until it runs out. With a single worker every
/// model call is serialized.
pub struct InferencePool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl InferencePool {
    pub fn new(
        model: Arc<dyn Classifier>,
        workers: usize,
        queue: usize,
        timeout: Option<Duration>,
    ) -> Result<InferencePool, StartupError> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let model = Arc::clone(&model);
            let receiver = Arc::clone(&receiver);
            let handle = std::thread::Builder::new()
                .name(format!("inference-{}", id))
                .spawn(move || worker_loop(id, model, receiver))
                .map_err(StartupError::Workers)?;
            handles.push(handle);
        }
        debug!("started {} inference worker(s), queue depth {}", workers, queue);

        Ok(InferencePool { sender: Some(sender), workers: handles, timeout })
    }

    /// Runs the model on `image` and waits for the scores.
    ///
    /// With a timeout set, the limit covers both waiting for a queue slot
    /// and waiting for the reply.
    pub fn infer(&self, image: NormalizedImage) -> Reply {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ClassificationError::InferenceError("inference pool is shut down".into()))?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job { image, reply: reply_tx };

        let Some(limit) = self.timeout else {
            sender
                .send(job)
                .map_err(|_| ClassificationError::InferenceError("inference workers are not running".into()))?;
            return reply_rx
                .recv()
                .map_err(|_| ClassificationError::InferenceError("inference worker dropped the request".into()))?;
        };

        let deadline = Instant::now() + limit;
        submit_before(sender, job, deadline, limit)?;
        match reply_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                warn!("inference timed out after {} ms", limit.as_millis());
                Err(ClassificationError::InferenceError(format!(
                    "inference timed out after {} ms",
                    limit.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(ClassificationError::InferenceError(
                "inference worker dropped the request".into(),
            )),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for InferencePool {
    fn drop(&mut self) {
        // Closing the queue ends every worker loop.
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("inference worker panicked during shutdown");
            }
        }
    }
}

/// Queues `job`, polling a full queue until `deadline`.
fn submit_before(
    sender: &SyncSender<Job>,
    mut job: Job,
    deadline: Instant,
    limit: Duration,
) -> Result<(), ClassificationError> {
    loop {
        match sender.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(_)) => {
                return Err(ClassificationError::InferenceError("inference workers are not running".into()))
            }
            Err(TrySendError::Full(back)) => {
                let now = Instant::now();
                if now >= deadline {
                    warn!("inference queue stayed full for {} ms", limit.as_millis());
                    return Err(ClassificationError::InferenceError(format!(
                        "inference queue full, no slot within {} ms",
                        limit.as_millis()
                    )));
                }
                job = back;
                std::thread::sleep(SUBMIT_POLL.min(deadline - now));
            }
        }
    }
}

fn worker_loop(id: usize, model: Arc<dyn Classifier>, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let next = match receiver.lock() {
            Ok(rx) => rx.recv(),
            Err(poisoned) => poisoned.into_inner().recv(),
        };
        let job = match next {
            Ok(job) => job,
            Err(_) => break,
        };

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.infer(&job.image)));
        let reply = match outcome {
            Ok(Ok(scores)) => Ok(scores),
            Ok(Err(e)) => Err(ClassificationError::from(e)),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!("inference worker {} caught a panic: {}", id, msg);
                Err(ClassificationError::InferenceError(format!("model panicked: {}", msg)))
            }
        };
        debug!("worker {} finished inference in {:.1} ms", id, started.elapsed().as_secs_f64() * 1000.0);

        // The requester may already have timed out.
        let _ = job.reply.send(reply);
    }
    debug!("inference worker {} exiting", id);
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::preprocess::ImageNormalizer;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores are the mean of each channel; sleeps to make overlap observable.
    struct ChannelMeans {
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ChannelMeans {
        fn new(delay: Duration) -> Self {
            ChannelMeans { delay, active: AtomicUsize::new(0), max_active: AtomicUsize::new(0) }
        }
    }

    impl Classifier for ChannelMeans {
        fn num_classes(&self) -> usize {
            3
        }
        fn input_len(&self) -> usize {
            12
        }
        fn infer(&self, image: &NormalizedImage) -> Result<Vec<f64>, ModelError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let v = image.to_input_vector();
            let n = (v.len() / 3) as f64;
            let mut sums = vec![0.0; 3];
            for (i, x) in v.iter().enumerate() {
                sums[i % 3] += x / n;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(sums)
        }
    }

    struct Panics;

    impl Classifier for Panics {
        fn num_classes(&self) -> usize {
            1
        }
        fn input_len(&self) -> usize {
            12
        }
        fn infer(&self, _: &NormalizedImage) -> Result<Vec<f64>, ModelError> {
            panic!("tensor shape mismatch")
        }
    }

    fn solid(rgb: [u8; 3]) -> NormalizedImage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb(rgb)));
        ImageNormalizer::new(2, 2).normalize_image(img)
    }

    #[test]
    fn returns_model_scores() {
        let pool = InferencePool::new(Arc::new(ChannelMeans::new(Duration::ZERO)), 2, 4, None).unwrap();
        let scores = pool.infer(solid([255, 0, 0])).unwrap();
        assert_eq!(scores, vec![1.0, 0.0, 0.0]);
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn single_worker_serializes_model_calls() {
        let model = Arc::new(ChannelMeans::new(Duration::from_millis(20)));
        let pool = Arc::new(InferencePool::new(model.clone(), 1, 8, None).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.infer(solid([0, 255, 0])).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![0.0, 1.0, 0.0]);
        }
        assert_eq!(model.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panics_become_inference_errors() {
        let pool = InferencePool::new(Arc::new(Panics), 1, 1, None).unwrap();
        let err = pool.infer(solid([0, 0, 0])).unwrap_err();
        assert!(matches!(err, ClassificationError::InferenceError(ref m) if m.contains("tensor shape mismatch")));
        // The worker survives and keeps serving.
        assert!(pool.infer(solid([0, 0, 0])).is_err());
    }

    #[test]
    fn slow_inference_times_out() {
        let model = Arc::new(ChannelMeans::new(Duration::from_millis(300)));
        let pool = InferencePool::new(model, 1, 1, Some(Duration::from_millis(20))).unwrap();
        let err = pool.infer(solid([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn timeout_covers_waiting_for_a_queue_slot() {
        let model = Arc::new(ChannelMeans::new(Duration::from_millis(600)));
        let pool = Arc::new(InferencePool::new(model, 1, 1, Some(Duration::from_millis(50))).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::sleep(Duration::from_millis(5 * i));
                std::thread::spawn(move || {
                    let started = Instant::now();
                    let outcome = pool.infer(solid([0, 0, 255]));
                    (started.elapsed(), outcome)
                })
            })
            .collect();
        for h in handles {
            let (elapsed, outcome) = h.join().unwrap();
            assert!(matches!(outcome, Err(ClassificationError::InferenceError(_))));
            assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
        }
    }
}
