use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

mod progress;

use progress::ProgressIndicator;
use specforge::change_detector::{ChangeDetector, ChangeKind};
use specforge::code_manager::{CodeManager, TreeNode};
use specforge::config::GeneratorConfig;
use specforge::contexts::{
    CodeGenerator, FileCodeCache, OpenAiTextGenerator, PromptKey, PromptRegistry,
    prompt_model_hash,
};
use specforge::data::{GeneratedCode, Specification};
use specforge::fingerprint::{fingerprint_page, fingerprint_spec};
use specforge::registries::{FileModelRegistry, FilePromptRegistry};
use specforge::task_manager::{TaskManager, WorkflowContext};
use specforge::workspace_store::{WorkspaceSession, WorkspaceStore};

pub struct Config {
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
}

const WORKSPACES_DIR: &str = "workspaces";
const CACHE_DIR: &str = "cache";

fn load_settings(config: &Config) -> Result<GeneratorConfig> {
    GeneratorConfig::load(config.config_path.as_deref()).context("Failed to load configuration")
}

fn load_spec(path: &Path) -> Result<Specification> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read specification: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse specification: {}", path.display()))
}

fn workspace_store(settings: &GeneratorConfig) -> WorkspaceStore {
    WorkspaceStore::new(Some(settings.cache_dir.join(WORKSPACES_DIR)))
}

pub async fn generate(
    spec_path: &Path,
    workspace: &str,
    out: &Path,
    dry_run: bool,
    config: &Config,
) -> Result<()> {
    let settings = load_settings(config)?;
    let spec = load_spec(spec_path)?;
    let store = workspace_store(&settings);
    let session = store.load(workspace)?;
    let previous = session.as_ref().map(|s| &s.specification);
    let existing = session.as_ref().map(|s| &s.code);

    if dry_run {
        return print_plan(&spec, previous, existing);
    }

    let prompts = FilePromptRegistry::new(Some(settings.prompts_dir.clone()));
    let models = FileModelRegistry::load(&settings.prompts_dir, &settings.model, false)?;
    let system_prompt = prompts.template(PromptKey::System)?;
    let cache = FileCodeCache::new(
        Some(settings.cache_dir.join(CACHE_DIR)),
        prompt_model_hash(&system_prompt, &settings.model),
    );
    let text_generator = OpenAiTextGenerator::new(&settings)?;

    let mut generator = CodeGenerator::new(Arc::new(text_generator))
        .with_models(Arc::new(models))
        .with_prompts(Arc::new(prompts))
        .with_cache(Arc::new(cache))
        .with_timeout(settings.request_timeout());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling remaining tasks");
            on_signal.cancel();
        }
    });

    println!("Generating {} into {}", spec.name, out.display());
    let code = generator
        .generate_with_cancel(&spec, previous, existing, cancel)
        .await;

    let mut progress = ProgressIndicator::new(generator.tasks().len());
    for task in generator.tasks() {
        progress.report_task(task);
    }
    progress.finish(generator.progress());

    let previous_paths: HashSet<String> = existing
        .map(|code| {
            code.values()
                .flat_map(|generated| generated.files.iter().map(|f| f.path.clone()))
                .collect()
        })
        .unwrap_or_default();
    let written = write_output(out, &generator.export_for_sandbox(), &previous_paths)?;
    println!("✓ Wrote {} file(s) to {}", written, out.display());

    let complete = generator.is_complete();
    store.save(workspace, &WorkspaceSession::new(spec, code))?;

    if !complete {
        anyhow::bail!("Generation finished with failed or skipped tasks");
    }
    Ok(())
}

fn print_plan(
    spec: &Specification,
    previous: Option<&Specification>,
    existing: Option<&HashMap<String, GeneratedCode>>,
) -> Result<()> {
    let mut detector = ChangeDetector::new();
    let changed: HashSet<String> = detector
        .detect_changes(spec, previous)
        .into_iter()
        .filter(|change| change.kind != ChangeKind::Deleted)
        .map(|change| change.entity_id)
        .collect();

    let mut tasks = TaskManager::new();
    let workflow = tasks.build_workflow(&WorkflowContext {
        spec,
        previous_spec: previous,
        existing_code: existing,
        changed_entity_ids: &changed,
    });

    if workflow.is_empty() {
        println!("[DRY RUN] Nothing to generate");
        return Ok(());
    }
    for step in workflow {
        println!("[DRY RUN] {} ({} task(s))", step.name, step.task_ids.len());
        for task_id in &step.task_ids {
            println!("  - {}", task_id);
        }
    }
    Ok(())
}

/// Write the exported files below `out` and remove files a previous run
/// produced that are no longer part of the output.
fn write_output(
    out: &Path,
    files: &BTreeMap<String, String>,
    previous_paths: &HashSet<String>,
) -> Result<usize> {
    for stale in previous_paths.iter().filter(|p| !files.contains_key(*p)) {
        let Some(relative) = safe_relative(stale) else {
            continue;
        };
        let target = out.join(relative);
        if target.exists() {
            fs::remove_file(&target)
                .with_context(|| format!("Failed to remove stale file: {}", target.display()))?;
            debug!(path = %target.display(), "removed stale file");
        }
    }

    let mut written = 0;
    for (path, content) in files {
        let Some(relative) = safe_relative(path) else {
            warn!(path = %path, "skipping file outside the output directory");
            continue;
        };
        let target = out.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&target, content)
            .with_context(|| format!("Failed to write file: {}", target.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Relative paths made only of normal segments; anything that could escape
/// the output directory is rejected.
fn safe_relative(path: &str) -> Option<&Path> {
    let path = Path::new(path);
    let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    (normal && path.components().next().is_some()).then_some(path)
}

pub fn fingerprint(spec_path: &Path, page: Option<&str>) -> Result<()> {
    let spec = load_spec(spec_path)?;
    let fingerprint = match page {
        Some(page_id) => fingerprint_page(&spec, page_id)?,
        None => fingerprint_spec(&spec),
    };
    println!("{}", fingerprint);
    Ok(())
}

pub fn changes(spec_path: &Path, workspace: &str, config: &Config) -> Result<()> {
    let settings = load_settings(config)?;
    let spec = load_spec(spec_path)?;
    let session = workspace_store(&settings).load(workspace)?;

    let records =
        ChangeDetector::new().detect_changes(&spec, session.as_ref().map(|s| &s.specification));
    if records.is_empty() {
        println!("No changes since the last generation");
        return Ok(());
    }
    for record in records {
        let marker = match record.kind {
            ChangeKind::Added => "+",
            ChangeKind::Modified => "~",
            ChangeKind::Deleted => "-",
        };
        println!("{} {}", marker, record.entity_id);
    }
    Ok(())
}

pub fn tree(workspace: &str, config: &Config) -> Result<()> {
    let settings = load_settings(config)?;
    let Some(session) = workspace_store(&settings).load(workspace)? else {
        println!("Workspace '{}' has not been generated yet", workspace);
        return Ok(());
    };

    let manager = CodeManager::from_generated(&session.code);
    if config.verbose {
        println!("{} file(s), generated {}", manager.len(), session.generated_at);
    }
    print_tree(&manager.file_tree(), 0);
    Ok(())
}

fn print_tree(nodes: &BTreeMap<String, TreeNode>, depth: usize) {
    let indent = "  ".repeat(depth);
    for (name, node) in nodes {
        match node {
            TreeNode::Directory { children } => {
                println!("{}{}/", indent, name);
                print_tree(children, depth + 1);
            }
            TreeNode::File { .. } => println!("{}{}", indent, name),
        }
    }
}

pub fn clear_cache(config: &Config) -> Result<()> {
    let settings = load_settings(config)?;
    let cache_dir = settings.cache_dir.join(CACHE_DIR);
    if !cache_dir.exists() {
        println!("✓ Cache already empty");
        return Ok(());
    }
    fs::remove_dir_all(&cache_dir)
        .with_context(|| format!("Failed to remove cache directory: {}", cache_dir.display()))?;
    println!("✓ Cleared {}", cache_dir.display());
    Ok(())
}
