//! The generation pipeline: change detection, workflow planning and staged
//! task execution against a shared [`CodeManager`].

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::change_detector::{ChangeDetector, ChangeKind};
use crate::code_manager::{CodeManager, TreeNode};
use crate::config::{DEFAULT_MODEL, GeneratorConfig};
use crate::data::{
    CodeCache, EntityRef, FileKind, GeneratedCode, GeneratedFile, GenerationMetadata, Specification,
};
use crate::error::GenerationError;
use crate::fingerprint::{fingerprint_entity, fingerprint_page, hash_content};
use crate::task_manager::{
    GenerationTask, Progress, TaskKind, TaskManager, TaskStatus, WorkflowContext, WorkflowStep,
};

use super::prompt_builder::{BuiltinPrompts, Prompt, PromptBuilder, PromptRegistry};
use super::response_parser::parse_response;
use super::stylesheet::{render_stylesheet, stylesheet_path};
use super::text_generator::{Model, TextGenerator};

/// Model identifier recorded for style guides, which never reach a model.
pub const TEMPLATE_MODEL: &str = "template";

/// Trait for resolving execution models by task kind
pub trait ModelRegistry: Send + Sync {
    fn model_for(&self, kind: TaskKind) -> Model;

    /// Whether every task of one stage of this kind may run at once.
    fn can_run_parallel(&self, kind: TaskKind) -> bool;
}

/// One model for everything, stages run sequentially.
#[derive(Debug, Clone)]
pub struct SingleModel {
    model: Model,
}

impl SingleModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            model: Model { name: name.into() },
        }
    }
}

impl ModelRegistry for SingleModel {
    fn model_for(&self, _kind: TaskKind) -> Model {
        self.model.clone()
    }

    fn can_run_parallel(&self, _kind: TaskKind) -> bool {
        false
    }
}

/// Collaborators shared by every task of a run.
#[derive(Clone)]
struct Services {
    text_generator: Arc<dyn TextGenerator>,
    models: Arc<dyn ModelRegistry>,
    prompts: Arc<dyn PromptRegistry>,
    cache: Option<Arc<dyn CodeCache>>,
    request_timeout: Duration,
}

/// Orchestrates one generation session.
///
/// The generator owns its [`ChangeDetector`], [`TaskManager`] and
/// [`CodeManager`]; nothing is shared between sessions except an optional
/// [`CodeCache`]. Calls to [`CodeGenerator::generate`] on one instance must
/// not overlap, which `&mut self` enforces.
pub struct CodeGenerator {
    services: Arc<Services>,
    code_manager: Arc<Mutex<CodeManager>>,
    task_manager: TaskManager,
    change_detector: ChangeDetector,
}

impl CodeGenerator {
    pub fn new(text_generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            services: Arc::new(Services {
                text_generator,
                models: Arc::new(SingleModel::new(DEFAULT_MODEL)),
                prompts: Arc::new(BuiltinPrompts),
                cache: None,
                request_timeout: GeneratorConfig::default().request_timeout(),
            }),
            code_manager: Arc::new(Mutex::new(CodeManager::new())),
            task_manager: TaskManager::new(),
            change_detector: ChangeDetector::new(),
        }
    }

    fn services_mut(&mut self) -> &mut Services {
        Arc::make_mut(&mut self.services)
    }

    pub fn with_models(mut self, models: Arc<dyn ModelRegistry>) -> Self {
        self.services_mut().models = models;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptRegistry>) -> Self {
        self.services_mut().prompts = prompts;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CodeCache>) -> Self {
        self.services_mut().cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.services_mut().request_timeout = request_timeout;
        self
    }

    /// Generate code for `spec`. See [`CodeGenerator::generate_with_cancel`].
    pub async fn generate(
        &mut self,
        spec: &Specification,
        previous: Option<&Specification>,
        existing: Option<&HashMap<String, GeneratedCode>>,
    ) -> HashMap<String, GeneratedCode> {
        self.generate_with_cancel(spec, previous, existing, CancellationToken::new())
            .await
    }

    /// Generate code for every entity of `spec` that changed since `previous`
    /// or has nothing in `existing`.
    ///
    /// Stages run in order and each waits for the previous one to settle. A
    /// failed task is recorded on the task and the run goes on; its
    /// dependents stay pending. Cancelling `cancel` fails the in-flight and
    /// not-yet-started tasks with [`GenerationError::Cancelled`].
    ///
    /// # Returns
    /// `existing` entries of entities still present in `spec`, overlaid with
    /// everything produced by this run. A changed entity whose task did not
    /// complete has no entry, so feeding the result back as `existing` plans
    /// it again.
    pub async fn generate_with_cancel(
        &mut self,
        spec: &Specification,
        previous: Option<&Specification>,
        existing: Option<&HashMap<String, GeneratedCode>>,
        cancel: CancellationToken,
    ) -> HashMap<String, GeneratedCode> {
        info!(spec = %spec.name, incremental = previous.is_some(), "starting code generation");

        let seeded = existing.map(CodeManager::from_generated).unwrap_or_default();
        self.code_manager = Arc::new(Mutex::new(seeded));

        let changes = self.change_detector.detect_changes(spec, previous);
        let mut changed: HashSet<String> = HashSet::new();
        let mut deleted: HashSet<String> = HashSet::new();
        for change in &changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => changed.insert(change.entity_id.clone()),
                ChangeKind::Deleted => deleted.insert(change.entity_id.clone()),
            };
        }
        info!(changed = changed.len(), deleted = deleted.len(), "detected changes");

        if let Some(existing) = existing {
            self.remove_deleted(&deleted, existing);
        }

        self.task_manager.build_workflow(&WorkflowContext {
            spec,
            previous_spec: previous,
            existing_code: existing,
            changed_entity_ids: &changed,
        });

        let shared_spec = Arc::new(spec.clone());
        let mut results: HashMap<String, GeneratedCode> = HashMap::new();
        let steps: Vec<WorkflowStep> = self.task_manager.workflow().to_vec();

        for step in &steps {
            if cancel.is_cancelled() {
                break;
            }
            info!(stage = %step.name, tasks = step.task_ids.len(), "running stage");

            let mut jobs = Vec::new();
            for task_id in &step.task_ids {
                let Some(task) = self.task_manager.task(task_id) else {
                    continue;
                };
                if task.status != TaskStatus::Pending {
                    continue;
                }
                if !self.task_manager.dependencies_completed(task) {
                    warn!(task = %task.id, "skipping task with unfinished dependencies");
                    continue;
                }
                jobs.push(TaskJob {
                    task_id: task.id.clone(),
                    kind: task.kind,
                    entity_id: task.entity_id.clone(),
                    spec: Arc::clone(&shared_spec),
                    services: Arc::clone(&self.services),
                    code_manager: Arc::clone(&self.code_manager),
                    cancel: cancel.clone(),
                });
            }

            if self.services.models.can_run_parallel(step.kind) {
                self.run_parallel(jobs, &mut results).await;
            } else {
                self.run_sequential(jobs, &mut results, &cancel).await;
            }
        }

        if cancel.is_cancelled() {
            self.cancel_pending();
        }

        let progress = self.task_manager.progress();
        info!(
            completed = progress.completed,
            total = progress.total,
            "code generation finished"
        );

        let mut output: HashMap<String, GeneratedCode> = HashMap::new();
        if let Some(existing) = existing {
            for entity in spec.all_entities() {
                let id = entity.id();
                // A changed entity only appears if this run regenerated it.
                if changed.contains(id) && !results.contains_key(id) {
                    debug!(entity = %id, "dropping stale code of ungenerated change");
                    continue;
                }
                if let Some(code) = existing.get(id) {
                    output.insert(id.to_string(), code.clone());
                }
            }
        }
        output.extend(results);
        output
    }

    async fn run_sequential(
        &mut self,
        jobs: Vec<TaskJob>,
        results: &mut HashMap<String, GeneratedCode>,
        cancel: &CancellationToken,
    ) {
        for job in jobs {
            let task_id = job.task_id.clone();
            let entity_id = job.entity_id.clone();
            if cancel.is_cancelled() {
                self.record(&task_id, &entity_id, Err(GenerationError::Cancelled), results);
                continue;
            }
            self.set_status(&task_id, TaskStatus::InProgress, None, None);
            let outcome = job.run().await;
            self.record(&task_id, &entity_id, outcome, results);
        }
    }

    async fn run_parallel(&mut self, jobs: Vec<TaskJob>, results: &mut HashMap<String, GeneratedCode>) {
        let mut outstanding: HashMap<String, String> = HashMap::new();
        let mut join_set = JoinSet::new();

        for job in jobs {
            self.set_status(&job.task_id, TaskStatus::InProgress, None, None);
            outstanding.insert(job.task_id.clone(), job.entity_id.clone());
            join_set.spawn(async move {
                let task_id = job.task_id.clone();
                (task_id, job.run().await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((task_id, outcome)) => {
                    if let Some(entity_id) = outstanding.remove(&task_id) {
                        self.record(&task_id, &entity_id, outcome, results);
                    }
                }
                Err(e) => error!(error = %e, "generation task aborted"),
            }
        }

        for (task_id, entity_id) in outstanding {
            let aborted = GenerationError::Service("task aborted".to_string());
            self.record(&task_id, &entity_id, Err(aborted), results);
        }
    }

    fn record(
        &mut self,
        task_id: &str,
        entity_id: &str,
        outcome: Result<GeneratedCode, GenerationError>,
        results: &mut HashMap<String, GeneratedCode>,
    ) {
        match outcome {
            Ok(code) => {
                debug!(task = task_id, files = code.files.len(), "task completed");
                results.insert(entity_id.to_string(), code.clone());
                self.set_status(task_id, TaskStatus::Completed, Some(code), None);
            }
            Err(e) => {
                warn!(task = task_id, error = %e, "task failed");
                self.set_status(task_id, TaskStatus::Failed, None, Some(e.to_string()));
            }
        }
    }

    fn set_status(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        result: Option<GeneratedCode>,
        error: Option<String>,
    ) {
        if let Err(e) = self.task_manager.update_task_status(task_id, status, result, error) {
            error!(task = task_id, error = %e, "rejected task status update");
        }
    }

    fn cancel_pending(&mut self) {
        let pending: Vec<String> = self
            .task_manager
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();
        for task_id in pending {
            let message = GenerationError::Cancelled.to_string();
            self.set_status(&task_id, TaskStatus::Failed, None, Some(message));
        }
    }

    fn remove_deleted(&mut self, deleted: &HashSet<String>, existing: &HashMap<String, GeneratedCode>) {
        let mut manager = lock(&self.code_manager);
        for entity_id in deleted {
            let Some(code) = existing.get(entity_id) else {
                continue;
            };
            for file in &code.files {
                if manager.has_file(&file.path) {
                    if let Err(e) = manager.delete_file(&file.path) {
                        warn!(path = %file.path, error = %e, "could not remove file of deleted entity");
                    }
                }
            }
            debug!(entity = %entity_id, "removed files of deleted entity");
        }
    }

    /// Flat path → content snapshot of the managed files.
    pub fn export_for_sandbox(&self) -> BTreeMap<String, String> {
        lock(&self.code_manager).export_for_sandbox()
    }

    pub fn file_tree(&self) -> BTreeMap<String, TreeNode> {
        lock(&self.code_manager).file_tree()
    }

    /// Independent copy of the current file set.
    pub fn code_manager(&self) -> CodeManager {
        lock(&self.code_manager).clone()
    }

    pub fn progress(&self) -> Progress {
        self.task_manager.progress()
    }

    pub fn workflow(&self) -> &[WorkflowStep] {
        self.task_manager.workflow()
    }

    pub fn tasks(&self) -> &[GenerationTask] {
        self.task_manager.tasks()
    }

    pub fn is_complete(&self) -> bool {
        self.task_manager.is_complete()
    }
}

fn lock(manager: &Mutex<CodeManager>) -> MutexGuard<'_, CodeManager> {
    manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cache key of one prompt-driven task: the page fingerprint plus the
/// populated prompt and the model, so editing a template or switching the
/// model of a task kind never serves code produced under the old ones.
fn cache_key(page_fingerprint: &str, prompt: &Prompt, model: &Model) -> String {
    hash_content(&format!(
        "{page_fingerprint}\n{}\n{}\n{}",
        model.name, prompt.system, prompt.user
    ))
}

/// Everything one task needs, owned so it can move onto a runtime worker.
struct TaskJob {
    task_id: String,
    kind: TaskKind,
    entity_id: String,
    spec: Arc<Specification>,
    services: Arc<Services>,
    code_manager: Arc<Mutex<CodeManager>>,
    cancel: CancellationToken,
}

impl TaskJob {
    /// Entities reach a job only when they changed or have no existing code;
    /// unchanged code is carried over by the caller without a task.
    async fn run(self) -> Result<GeneratedCode, GenerationError> {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        match self.kind {
            TaskKind::StyleGuide => self.generate_style_guide(),
            TaskKind::Component | TaskKind::Page => self.generate_from_prompt().await,
            TaskKind::Integration => Err(GenerationError::UnsupportedEntity {
                id: self.entity_id.clone(),
                kind: self.kind.as_str().to_string(),
            }),
        }
    }

    fn generate_style_guide(&self) -> Result<GeneratedCode, GenerationError> {
        let style = self
            .spec
            .styles
            .iter()
            .find(|s| s.id == self.entity_id)
            .ok_or_else(|| GenerationError::NotFound(format!("style guide {}", self.entity_id)))?;

        let files = vec![GeneratedFile {
            path: stylesheet_path(&self.spec, style),
            content: render_stylesheet(style),
            kind: FileKind::Style,
        }];
        self.write_files(&files)?;

        Ok(GeneratedCode {
            files,
            dependency_entity_ids: Vec::new(),
            metadata: GenerationMetadata {
                entity_id: self.entity_id.clone(),
                content_fingerprint: fingerprint_entity(EntityRef::Style(style)),
                generated_at: Utc::now(),
                model_identifier: TEMPLATE_MODEL.to_string(),
            },
        })
    }

    async fn generate_from_prompt(&self) -> Result<GeneratedCode, GenerationError> {
        let prompt = PromptBuilder::new(&self.spec, self.services.prompts.as_ref()).build(&self.entity_id)?;
        let page = self
            .spec
            .page(&self.entity_id)
            .ok_or_else(|| GenerationError::NotFound(format!("page {}", self.entity_id)))?;
        let model = self.services.models.model_for(self.kind);
        let key = cache_key(&fingerprint_page(&self.spec, &self.entity_id)?, &prompt, &model);

        if let Some(entry) = self.services.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!(entity = %self.entity_id, "code cache hit");
            self.write_files(&entry.generated_code.files)?;
            return Ok(entry.generated_code);
        }

        let text = self.complete(&prompt, &model).await?;
        let files = parse_response(&text, page);
        self.write_files(&files)?;

        let code = GeneratedCode {
            files,
            dependency_entity_ids: prompt.dependency_entity_ids,
            metadata: GenerationMetadata {
                entity_id: self.entity_id.clone(),
                content_fingerprint: fingerprint_entity(EntityRef::Page(page)),
                generated_at: Utc::now(),
                model_identifier: model.name,
            },
        };
        if let Some(cache) = &self.services.cache {
            cache.put(&key, &self.entity_id, &code);
        }
        Ok(code)
    }

    /// Call the text generator, racing cancellation and the request timeout.
    async fn complete(&self, prompt: &Prompt, model: &Model) -> Result<String, GenerationError> {
        let timeout = self.services.request_timeout;
        let call = self
            .services
            .text_generator
            .complete(&prompt.system, &prompt.user, model);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Service(format!(
                    "request for {} timed out after {}s",
                    self.entity_id,
                    timeout.as_secs_f64()
                ))),
            },
        }
    }

    /// Apply every file under one lock acquisition. The writes are staged on
    /// a copy so a conflict leaves the shared file set untouched.
    fn write_files(&self, files: &[GeneratedFile]) -> Result<(), GenerationError> {
        let mut manager = lock(&self.code_manager);
        let mut staged = manager.clone();
        for file in files {
            staged.upsert_file(&file.path, &file.content, file.kind)?;
        }
        *manager = staged;
        Ok(())
    }
}
