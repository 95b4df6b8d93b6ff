use std::time::Instant;

use specforge::task_manager::{GenerationTask, Progress, TaskStatus};

pub struct ProgressIndicator {
    total: usize,
    completed: usize,
    failed: usize,
    pending: usize,
    start_time: Instant,
}

impl ProgressIndicator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            pending: 0,
            start_time: Instant::now(),
        }
    }

    pub fn report_task(&mut self, task: &GenerationTask) {
        match task.status {
            TaskStatus::Completed => {
                self.completed += 1;
                println!("✓ {} {}", task.kind.as_str(), task.entity_id);
            }
            TaskStatus::Failed => {
                self.failed += 1;
                println!(
                    "✗ {} {}: {}",
                    task.kind.as_str(),
                    task.entity_id,
                    task.error.as_deref().unwrap_or("unknown error")
                );
            }
            TaskStatus::Pending | TaskStatus::InProgress => {
                self.pending += 1;
                println!("⊚ {} {} (not run)", task.kind.as_str(), task.entity_id);
            }
        }
    }

    pub fn finish(&self, progress: Progress) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Summary:");
        println!("  Total:     {}", self.total);
        println!("  Succeeded: {}", self.completed);
        println!("  Failed:    {}", self.failed);
        if self.pending > 0 {
            println!("  Not run:   {}", self.pending);
        }
        println!("  Progress:  {}%", progress.percentage);
        println!("  Duration:  {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}
