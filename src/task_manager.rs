//! Staged workflow of generation tasks.
//!
//! Stages run style guides → components → pages → integrations. A task only
//! ever depends on tasks of strictly earlier stages, so the task graph is
//! acyclic by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::data::{GeneratedCode, PageKind, Specification};
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    StyleGuide,
    Component,
    Page,
    Integration,
}

impl TaskKind {
    pub fn priority(&self) -> u8 {
        match self {
            TaskKind::StyleGuide => 1,
            TaskKind::Component => 2,
            TaskKind::Page => 3,
            TaskKind::Integration => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::StyleGuide => "style-guide",
            TaskKind::Component => "component",
            TaskKind::Page => "page",
            TaskKind::Integration => "integration",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn can_become(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::InProgress | TaskStatus::Failed) => true,
            (TaskStatus::InProgress, TaskStatus::Completed | TaskStatus::Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: u8,
    pub entity_id: String,
    pub dependency_task_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GeneratedCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub name: String,
    pub description: String,
    pub kind: TaskKind,
    pub task_ids: Vec<String>,
    pub status: TaskStatus,
}

/// Inputs for planning one run.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowContext<'a> {
    pub spec: &'a Specification,
    pub previous_spec: Option<&'a Specification>,
    pub existing_code: Option<&'a HashMap<String, GeneratedCode>>,
    pub changed_entity_ids: &'a HashSet<String>,
}

impl WorkflowContext<'_> {
    /// Changed entities and entities with nothing cached need a task.
    fn needs_generation(&self, entity_id: &str) -> bool {
        self.changed_entity_ids.contains(entity_id)
            || self
                .existing_code
                .is_none_or(|existing| !existing.contains_key(entity_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

/// Owns the task and workflow state of one run.
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Vec<GenerationTask>,
    index: HashMap<String, usize>,
    workflow: Vec<WorkflowStep>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan the run, replacing any previous plan. Empty stages are left out.
    pub fn build_workflow(&mut self, context: &WorkflowContext<'_>) -> &[WorkflowStep] {
        self.reset();

        let style_ids = self.create_style_guide_step(context);
        let component_ids = self.create_component_step(context, &style_ids);
        let mut upstream = style_ids;
        upstream.extend(component_ids);
        self.create_page_step(context, &upstream);
        self.create_integration_step(context);

        debug!(
            steps = self.workflow.len(),
            tasks = self.tasks.len(),
            incremental = context.previous_spec.is_some(),
            "workflow built"
        );
        &self.workflow
    }

    fn create_style_guide_step(&mut self, context: &WorkflowContext<'_>) -> Vec<String> {
        let entity_ids: Vec<&str> = context
            .spec
            .styles
            .iter()
            .map(|s| s.id.as_str())
            .filter(|id| context.needs_generation(id))
            .collect();

        self.push_step(
            "Style Guide Generation",
            "Generate global styles and theme configuration",
            TaskKind::StyleGuide,
            &entity_ids,
            &[],
        )
    }

    /// Every component depends on every style task.
    fn create_component_step(&mut self, context: &WorkflowContext<'_>, style_ids: &[String]) -> Vec<String> {
        let entity_ids = page_entities(context, PageKind::Component);
        self.push_step(
            "Component Generation",
            "Generate reusable components",
            TaskKind::Component,
            &entity_ids,
            style_ids,
        )
    }

    /// Every page depends on every style and component task.
    fn create_page_step(&mut self, context: &WorkflowContext<'_>, upstream_ids: &[String]) -> Vec<String> {
        let entity_ids = page_entities(context, PageKind::Page);
        self.push_step(
            "Page Generation",
            "Generate page components",
            TaskKind::Page,
            &entity_ids,
            upstream_ids,
        )
    }

    /// Extension point for API routes and configuration; plans nothing yet.
    fn create_integration_step(&mut self, _context: &WorkflowContext<'_>) -> Vec<String> {
        self.push_step(
            "Integration & Configuration",
            "Generate API routes, configs, and integrations",
            TaskKind::Integration,
            &[],
            &[],
        )
    }

    fn push_step(
        &mut self,
        name: &str,
        description: &str,
        kind: TaskKind,
        entity_ids: &[&str],
        dependencies: &[String],
    ) -> Vec<String> {
        let now = Utc::now();
        let mut task_ids = Vec::new();

        for entity_id in entity_ids {
            let task = GenerationTask {
                id: format!("{}-{entity_id}", kind.as_str()),
                kind,
                status: TaskStatus::Pending,
                priority: kind.priority(),
                entity_id: entity_id.to_string(),
                dependency_task_ids: dependencies.to_vec(),
                result: None,
                error: None,
                created_at: now,
                completed_at: None,
            };
            if self.index.contains_key(&task.id) {
                warn!(task = %task.id, "duplicate entity id, planning it once");
                continue;
            }
            task_ids.push(task.id.clone());
            self.index.insert(task.id.clone(), self.tasks.len());
            self.tasks.push(task);
        }

        if !task_ids.is_empty() {
            self.workflow.push(WorkflowStep {
                name: name.to_string(),
                description: description.to_string(),
                kind,
                task_ids: task_ids.clone(),
                status: TaskStatus::Pending,
            });
        }
        task_ids
    }

    /// Lowest-priority-number pending task whose dependencies all completed.
    /// Ties go to the task planned first.
    pub fn next_runnable_task(&self) -> Option<&GenerationTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && self.dependencies_completed(t))
            .min_by_key(|t| t.priority)
    }

    pub fn dependencies_completed(&self, task: &GenerationTask) -> bool {
        task.dependency_task_ids
            .iter()
            .all(|id| self.task(id).is_some_and(|dep| dep.status == TaskStatus::Completed))
    }

    /// Pending tasks that can never run because a dependency failed.
    pub fn blocked_tasks(&self) -> Vec<&GenerationTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependency_task_ids
                    .iter()
                    .any(|id| self.task(id).is_some_and(|dep| dep.status == TaskStatus::Failed))
            })
            .collect()
    }

    /// Move a task forward. Statuses only advance:
    /// pending → in-progress → completed | failed, or pending → failed.
    pub fn update_task_status(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        result: Option<GeneratedCode>,
        error: Option<String>,
    ) -> Result<(), TaskError> {
        let position = *self
            .index
            .get(task_id)
            .ok_or_else(|| TaskError::UnknownTask(task_id.to_string()))?;
        let task = &mut self.tasks[position];

        if !task.status.can_become(status) {
            return Err(TaskError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        if error.is_some() {
            task.error = error;
        }
        if status == TaskStatus::Completed {
            task.completed_at = Some(Utc::now());
        }

        self.refresh_step_statuses();
        Ok(())
    }

    fn refresh_step_statuses(&mut self) {
        let statuses: HashMap<&str, TaskStatus> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.status))
            .collect();

        for step in &mut self.workflow {
            let step_statuses: Vec<TaskStatus> = step
                .task_ids
                .iter()
                .filter_map(|id| statuses.get(id.as_str()).copied())
                .collect();

            step.status = if step_statuses.iter().all(|s| *s == TaskStatus::Completed) {
                TaskStatus::Completed
            } else if step_statuses.contains(&TaskStatus::Failed) {
                TaskStatus::Failed
            } else if step_statuses.contains(&TaskStatus::InProgress) {
                TaskStatus::InProgress
            } else {
                TaskStatus::Pending
            };
        }
    }

    pub fn progress(&self) -> Progress {
        let total = self.tasks.len();
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let percentage = if total == 0 {
            0
        } else {
            (completed as f64 * 100.0 / total as f64).round() as u8
        };
        Progress {
            completed,
            total,
            percentage,
        }
    }

    /// True when every planned task completed. A run with nothing to plan is
    /// complete.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    pub fn task(&self, task_id: &str) -> Option<&GenerationTask> {
        self.index.get(task_id).map(|&i| &self.tasks[i])
    }

    pub fn tasks(&self) -> &[GenerationTask] {
        &self.tasks
    }

    pub fn workflow(&self) -> &[WorkflowStep] {
        &self.workflow
    }

    pub fn reset(&mut self) {
        self.tasks.clear();
        self.index.clear();
        self.workflow.clear();
    }
}

fn page_entities<'a>(context: &WorkflowContext<'a>, kind: PageKind) -> Vec<&'a str> {
    context
        .spec
        .pages
        .iter()
        .filter(|p| p.kind == kind)
        .map(|p| p.id.as_str())
        .filter(|id| context.needs_generation(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generated(entity_id: &str) -> GeneratedCode {
        GeneratedCode {
            files: Vec::new(),
            dependency_entity_ids: Vec::new(),
            metadata: crate::data::GenerationMetadata {
                entity_id: entity_id.to_string(),
                content_fingerprint: String::new(),
                generated_at: Utc::now(),
                model_identifier: "test".to_string(),
            },
        }
    }

    fn spec() -> Specification {
        serde_json::from_value(json!({
            "styles": [{ "id": "s1" }],
            "pages": [
                { "id": "c1", "type": "component" },
                { "id": "p1", "type": "page" },
                { "id": "c2", "type": "component" },
                { "id": "p2", "type": "page" },
                { "id": "p3", "type": "page" },
                { "id": "f1", "type": "folder" }
            ]
        }))
        .unwrap()
    }

    fn all_changed(spec: &Specification) -> HashSet<String> {
        spec.all_entities().iter().map(|e| e.id().to_string()).collect()
    }

    fn build(manager: &mut TaskManager, spec: &Specification, changed: &HashSet<String>) {
        manager.build_workflow(&WorkflowContext {
            spec,
            previous_spec: None,
            existing_code: None,
            changed_entity_ids: changed,
        });
    }

    fn finish(manager: &mut TaskManager, task_id: &str) {
        manager
            .update_task_status(task_id, TaskStatus::InProgress, None, None)
            .unwrap();
        manager
            .update_task_status(task_id, TaskStatus::Completed, None, None)
            .unwrap();
    }

    #[test]
    fn stages_follow_dependency_order() {
        let spec = spec();
        let changed = all_changed(&spec);
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);

        let kinds: Vec<TaskKind> = manager.workflow().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![TaskKind::StyleGuide, TaskKind::Component, TaskKind::Page]);
        assert_eq!(manager.tasks().len(), 6);

        let style_and_components: HashSet<&str> = manager
            .tasks()
            .iter()
            .filter(|t| t.kind != TaskKind::Page)
            .map(|t| t.id.as_str())
            .collect();
        for page in manager.tasks().iter().filter(|t| t.kind == TaskKind::Page) {
            let deps: HashSet<&str> = page.dependency_task_ids.iter().map(String::as_str).collect();
            assert!(deps.is_superset(&style_and_components));
        }
        for component in manager.tasks().iter().filter(|t| t.kind == TaskKind::Component) {
            assert_eq!(component.dependency_task_ids, vec!["style-guide-s1".to_string()]);
        }
    }

    #[test]
    fn unchanged_cached_entities_get_no_task() {
        let spec = spec();
        let changed: HashSet<String> = ["p2".to_string()].into_iter().collect();
        let mut cached: HashMap<String, GeneratedCode> = HashMap::new();
        for id in ["s1", "c1", "c2", "p1", "p2", "p3"] {
            cached.insert(id.to_string(), generated(id));
        }

        let mut manager = TaskManager::new();
        manager.build_workflow(&WorkflowContext {
            spec: &spec,
            previous_spec: Some(&spec),
            existing_code: Some(&cached),
            changed_entity_ids: &changed,
        });

        assert_eq!(manager.workflow().len(), 1);
        assert_eq!(manager.tasks().len(), 1);
        assert_eq!(manager.tasks()[0].id, "page-p2");
        assert!(manager.tasks()[0].dependency_task_ids.is_empty());
    }

    #[test]
    fn next_runnable_respects_priority_and_dependencies() {
        let spec = spec();
        let changed = all_changed(&spec);
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);

        assert_eq!(manager.next_runnable_task().unwrap().id, "style-guide-s1");
        manager
            .update_task_status("style-guide-s1", TaskStatus::InProgress, None, None)
            .unwrap();
        assert!(manager.next_runnable_task().is_none());

        manager
            .update_task_status("style-guide-s1", TaskStatus::Completed, None, None)
            .unwrap();
        assert_eq!(manager.next_runnable_task().unwrap().id, "component-c1");

        finish(&mut manager, "component-c1");
        assert_eq!(manager.next_runnable_task().unwrap().id, "component-c2");
        finish(&mut manager, "component-c2");
        assert_eq!(manager.next_runnable_task().unwrap().id, "page-p1");
    }

    #[test]
    fn failed_dependency_blocks_dependents() {
        let spec = spec();
        let changed = all_changed(&spec);
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);

        manager
            .update_task_status("style-guide-s1", TaskStatus::InProgress, None, None)
            .unwrap();
        manager
            .update_task_status("style-guide-s1", TaskStatus::Failed, None, Some("boom".to_string()))
            .unwrap();

        assert!(manager.next_runnable_task().is_none());
        assert_eq!(manager.blocked_tasks().len(), 2);
        assert_eq!(manager.workflow()[0].status, TaskStatus::Failed);
        assert_eq!(manager.task("style-guide-s1").unwrap().error.as_deref(), Some("boom"));
        assert!(!manager.is_complete());
    }

    #[test]
    fn statuses_never_move_backwards() {
        let spec = spec();
        let changed = all_changed(&spec);
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);
        finish(&mut manager, "style-guide-s1");

        let err = manager
            .update_task_status("style-guide-s1", TaskStatus::Pending, None, None)
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
        assert!(matches!(
            manager.update_task_status("task-zz", TaskStatus::InProgress, None, None),
            Err(TaskError::UnknownTask(_))
        ));
        assert!(manager.task("style-guide-s1").unwrap().completed_at.is_some());
    }

    #[test]
    fn progress_counts_completed_tasks() {
        let spec = spec();
        let changed = all_changed(&spec);
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);

        let mut last = manager.progress().completed;
        for id in ["style-guide-s1", "component-c1", "component-c2"] {
            finish(&mut manager, id);
            let progress = manager.progress();
            assert_eq!(progress.completed, last + 1);
            assert_eq!(
                progress.percentage,
                (100.0 * progress.completed as f64 / progress.total as f64).round() as u8
            );
            last = progress.completed;
        }
        assert_eq!(manager.progress().percentage, 50);
        assert_eq!(manager.workflow()[1].status, TaskStatus::Completed);
        assert_eq!(manager.workflow()[2].status, TaskStatus::Pending);
    }

    #[test]
    fn shared_id_across_categories_plans_both_tasks() {
        let spec: Specification = serde_json::from_value(json!({
            "styles": [{ "id": "brand" }],
            "pages": [{ "id": "brand", "type": "page" }, { "id": "brand", "type": "page" }]
        }))
        .unwrap();
        let changed = all_changed(&spec);
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);

        let ids: Vec<&str> = manager.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["style-guide-brand", "page-brand"]);
        assert_eq!(
            manager.task("page-brand").unwrap().dependency_task_ids,
            vec!["style-guide-brand".to_string()]
        );
    }

    #[test]
    fn empty_plan_reports_zero_percent() {
        let spec = Specification::default();
        let changed = HashSet::new();
        let mut manager = TaskManager::new();
        build(&mut manager, &spec, &changed);

        assert!(manager.workflow().is_empty());
        assert_eq!(
            manager.progress(),
            Progress {
                completed: 0,
                total: 0,
                percentage: 0
            }
        );
        assert!(manager.is_complete());
    }
}
