//! Terminal presenter: one indicatif bar per job, result lines printed above.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use jobwatch_types::{JobStatus, ResourceDocument, Steps};

use crate::observer::Presenter;
use crate::view::JobView;

const BAR_TEMPLATE: &str = "  {prefix:24!} [{bar:30}] {pos:>3}% {msg}";

pub struct TerminalPresenter {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            style,
        }
    }

    fn bar_for(&mut self, view: &JobView) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.bars.entry(view.job.id.clone()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar
        })
    }

    fn println(&self, line: String) {
        if self.multi.println(line).is_err() {
            tracing::debug!("terminal closed, dropping output line");
        }
    }
}

impl Default for TerminalPresenter {
    fn default() -> Self {
        Self::new()
    }
}

fn label(view: &JobView) -> &str {
    if view.job.title.is_empty() {
        &view.job.id
    } else {
        &view.job.title
    }
}

fn status_line(view: &JobView) -> String {
    let job = &view.job;
    match job.status {
        JobStatus::Completed => "done".to_string(),
        JobStatus::Error => "failed".to_string(),
        JobStatus::Pending | JobStatus::InProgress => {
            let mut line = format!("step {}/{} {}", job.step_index, Steps::COUNT, job.status_message);
            if view.awaiting_confirmation {
                line.push_str(" (starting)");
            }
            if view.timed_out {
                line.push_str(" (still running)");
            }
            line
        }
    }
}

impl Presenter for TerminalPresenter {
    fn render(&mut self, views: &[JobView]) {
        let live: Vec<&str> = views.iter().map(JobView::id).collect();
        let gone: Vec<String> = self
            .bars
            .keys()
            .filter(|id| !live.contains(&id.as_str()))
            .cloned()
            .collect();
        for id in gone {
            if let Some(bar) = self.bars.remove(&id) {
                self.multi.remove(&bar);
            }
        }

        for view in views {
            let bar = self.bar_for(view);
            bar.set_prefix(label(view).to_string());
            bar.set_position(u64::from(view.job.progress_percentage));
            bar.set_message(status_line(view));
            if view.is_terminal() && !bar.is_finished() {
                bar.finish();
            }
        }
    }

    fn show_result(&mut self, view: &JobView, document: &ResourceDocument) {
        self.println(format!(
            "  \u{2713} {} ready: {} {}",
            label(view),
            document.resource_type,
            document.resource_id
        ));
    }

    fn show_error(&mut self, view: &JobView, message: &str) {
        self.println(format!("  \u{2717} {}: {}", label(view), message));
    }

    fn show_timeout(&mut self, view: &JobView) {
        self.println(format!(
            "  \u{2026} {} is still running. Check back later.",
            label(view)
        ));
    }
}
