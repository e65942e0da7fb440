use std::{
    sync::mpsc::{Sender, channel},
    thread::{self, JoinHandle},
};

use log::{debug, error};

use crate::{WispError, session::live::EngineInput};

use super::{PersistenceAdapter, SaveRequest};

struct SaveJob {
    request: SaveRequest,
    reply: Sender<EngineInput>,
}

/// Runs a persistence adapter on its own thread so a slow write never blocks the
/// session engine. Each completed save is reported back as
/// [`EngineInput::SaveCompleted`].
pub struct PersistenceWorker {
    sender: Option<Sender<SaveJob>>,
    handle: Option<JoinHandle<()>>,
}

impl PersistenceWorker {
    pub fn spawn(mut adapter: Box<dyn PersistenceAdapter + Send>) -> Self {
        let (sender, receiver) = channel::<SaveJob>();
        let handle = thread::spawn(move || {
            for job in &receiver {
                let SaveJob { request, reply } = job;
                let outcome = adapter.save(&request.route, &request.result, &request.summary);
                if let Err(e) = &outcome {
                    error!("Persistence worker failed to save run: {}", e);
                }
                if reply.send(EngineInput::SaveCompleted(outcome)).is_err() {
                    debug!("Session engine gone before the save completed");
                }
            }
            debug!("Persistence worker exiting");
        });

        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queues a save. The outcome arrives on `reply`.
    pub fn submit(&self, request: SaveRequest, reply: Sender<EngineInput>) -> Result<(), WispError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| WispError::PersistenceFailure {
                reason: "persistence worker already shut down".to_string(),
            })?;
        sender
            .send(SaveJob { request, reply })
            .map_err(|_| WispError::PersistenceFailure {
                reason: "persistence worker is not running".to_string(),
            })
    }

    /// Finishes queued saves and stops the thread.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Persistence worker thread panicked");
            }
        }
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comparison::{RaceResult, RaceStatus},
        persistence::MemoryStorage,
        session::RunSummary,
        tracking::Route,
    };
    use std::time::Duration;

    fn request() -> SaveRequest {
        let route = Route::default();
        SaveRequest {
            summary: RunSummary::new("pr", &route, 0., 0., 1000.),
            route,
            result: RaceResult {
                status: RaceStatus::Lost,
                time_difference: 0.,
                distance_completed: 0.,
                completion_percentage: 0.,
                split_comparisons: vec![],
                avg_gap: 0.,
                max_gap: 0.,
                min_gap: 0.,
            },
        }
    }

    #[test]
    fn test_worker_reports_completion() {
        let storage = MemoryStorage::default();
        let mut worker = PersistenceWorker::spawn(Box::new(storage.clone()));
        let (reply, completions) = channel();

        worker.submit(request(), reply).unwrap();
        match completions.recv_timeout(Duration::from_secs(5)) {
            Ok(EngineInput::SaveCompleted(Ok(id))) => assert!(storage.get(&id).is_some()),
            other => panic!("unexpected completion: {:?}", other),
        }

        worker.shutdown();
        let (reply, _completions) = channel();
        assert!(worker.submit(request(), reply).is_err());
    }

    #[test]
    fn test_worker_reports_failure() {
        let worker = PersistenceWorker::spawn(Box::new(MemoryStorage::failing()));
        let (reply, completions) = channel();
        worker.submit(request(), reply).unwrap();
        assert!(matches!(
            completions.recv_timeout(Duration::from_secs(5)),
            Ok(EngineInput::SaveCompleted(Err(WispError::PersistenceFailure { .. })))
        ));
    }
}
