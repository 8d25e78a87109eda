//! Scripted in-process [`QuestionService`] used by unit tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::generator::{
    QuestionService,
    error::{UpstreamError, UpstreamResult},
    models::{GeneratedQuestion, GenerationRequest, GradingRequest, GradingVerdict},
};

/// Generates numbered questions and grades by case-insensitive comparison.
///
/// Generation can be made to fail, or held until [`ScriptedService::release`] is called.
pub(crate) struct ScriptedService {
    counter: AtomicUsize,
    fail_generation: AtomicBool,
    fail_grading: AtomicBool,
    /// Remaining generations allowed to succeed before failures start (`usize::MAX` = unlimited).
    generation_budget: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    generation_requests: Mutex<Vec<GenerationRequest>>,
    grading_requests: Mutex<Vec<GradingRequest>>,
}

impl ScriptedService {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Generation calls block until permits are released.
    pub(crate) fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Arc::new(Semaphore::new(0)))))
    }

    fn build(gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail_generation: AtomicBool::new(false),
            fail_grading: AtomicBool::new(false),
            generation_budget: AtomicUsize::new(usize::MAX),
            gate,
            generation_requests: Mutex::new(Vec::new()),
            grading_requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_generation(&self, fail: bool) {
        self.fail_generation.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_grading(&self, fail: bool) {
        self.fail_grading.store(fail, Ordering::SeqCst);
    }

    /// Let the next `count` generations succeed and fail every one after that.
    pub(crate) fn succeed_only(&self, count: usize) {
        self.generation_budget.store(count, Ordering::SeqCst);
    }

    /// Let `permits` gated generations complete.
    pub(crate) fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn generation_requests(&self) -> Vec<GenerationRequest> {
        self.generation_requests.lock().unwrap().clone()
    }

    pub(crate) fn grading_requests(&self) -> Vec<GradingRequest> {
        self.grading_requests.lock().unwrap().clone()
    }

    pub(crate) fn generation_calls(&self) -> usize {
        self.generation_requests.lock().unwrap().len()
    }

    fn take_budget(&self) -> bool {
        self.generation_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok()
    }
}

fn refused() -> UpstreamError {
    UpstreamError::unavailable(
        "scripted failure",
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
    )
}

impl QuestionService for ScriptedService {
    fn generate_question(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, UpstreamResult<GeneratedQuestion>> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = self.fail_generation.load(Ordering::SeqCst) || !self.take_budget();
        let category = request.category_name.clone();
        self.generation_requests.lock().unwrap().push(request);
        let gate = self.gate.clone();

        Box::pin(async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if fail {
                return Err(refused());
            }
            Ok(GeneratedQuestion {
                question: format!("{category} question #{n}"),
                correct_answer: format!("answer {n}"),
                explanation: None,
            })
        })
    }

    fn grade_answer(
        &self,
        request: GradingRequest,
    ) -> BoxFuture<'static, UpstreamResult<GradingVerdict>> {
        let fail = self.fail_grading.load(Ordering::SeqCst);
        let is_correct = request
            .user_answer
            .trim()
            .eq_ignore_ascii_case(request.correct_answer.trim());
        self.grading_requests.lock().unwrap().push(request);

        Box::pin(async move {
            if fail {
                return Err(refused());
            }
            Ok(GradingVerdict {
                is_correct,
                feedback: if is_correct { "correct" } else { "wrong" }.into(),
                similarity: if is_correct { 1.0 } else { 0.0 },
            })
        })
    }
}
