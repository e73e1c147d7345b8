/// Events emitted by long-running drivers such as slack estimation.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// A new trial with the given slack starts; `steps` updates will follow.
    TrialStart { slack: f64, steps: u64 },
    /// One update finished, leaving `pairs` pairs in the list.
    StepCompleted { pairs: usize },
    TrialFinish { cost_per_step: f64 },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_ignores_events() {
        ProgressReporter::new().report(Progress::Message("ignored".to_string()));
    }

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            seen.lock().unwrap().push(event);
        }));
        reporter.report(Progress::TrialStart {
            slack: 0.5,
            steps: 3,
        });
        reporter.report(Progress::StepCompleted { pairs: 12 });
        drop(reporter);

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], Progress::StepCompleted { pairs: 12 });
    }
}
