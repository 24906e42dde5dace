//! The Play: stage-by-stage concurrent execution of the whole plan.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::StageConfig;
use crate::gate::StageGate;
use crate::notify::Notifier;
use crate::palette;
use crate::render::render_command;
use crate::sink::ErrorSink;
use crate::task::{self, TaskRecord, TaskSpec, TaskStyle};

/// Options for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Prefix every mirrored line with its task's rendered command.
    pub verbose: bool,
    /// Emit ANSI color tags (suppressed automatically off-terminal).
    pub color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayState {
    Pending,
    Finished,
}

/// The staged plan and, after [`Play::run`], its execution records.
///
/// A Play is created once per invocation and discarded after results are
/// reported; it holds no state across invocations.
pub struct Play {
    stages: Vec<StageConfig>,
    vars: HashMap<String, String>,
    notifier: Arc<dyn Notifier>,
    state: PlayState,
    tasks: Vec<TaskRecord>,
}

impl Play {
    pub fn new(
        stages: Vec<StageConfig>,
        vars: HashMap<String, String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            stages,
            vars,
            notifier,
            state: PlayState::Pending,
            tasks: Vec::new(),
        }
    }

    /// Run every stage in order; within a stage all steps run concurrently.
    ///
    /// Stage N+1 never starts before every stage N task has signaled the
    /// gate. Task failures never halt the run: they are collected by the
    /// error sink and recorded on the task records. A step whose template
    /// fails to render is reported, recorded as a failed unrun task, and
    /// counted against the gate immediately, so the stage cannot hang on a
    /// task that was never started.
    #[instrument(skip_all, fields(stages = self.stages.len()))]
    pub fn run(&mut self, options: RunOptions) -> Result<()> {
        if self.state == PlayState::Finished {
            bail!("play already finished (construct a new one to re-run)");
        }

        let sink = ErrorSink::start();
        let gate = Arc::new(StageGate::new());
        let use_color = options.color && palette::stdout_supports_color();

        for (stage_idx, stage) in self.stages.iter().enumerate() {
            debug!(stage = stage_idx, steps = stage.steps.len(), "starting stage");
            // Armed for every step up front: unrenderable steps count too.
            gate.arm(stage.steps.len());
            let (tx, rx) = mpsc::channel::<(usize, TaskRecord)>();

            for (step_idx, template) in stage.steps.iter().enumerate() {
                let name = format!("{stage_idx}_{step_idx}");
                let creation_idx = self.tasks.len() + step_idx;
                match render_command(template, &self.vars) {
                    Ok(command) => {
                        let spec = TaskSpec { name, command };
                        let style = TaskStyle {
                            color: use_color.then(|| palette::color_for(creation_idx)),
                            verbose: options.verbose,
                        };
                        let guard = gate.guard();
                        let tx = tx.clone();
                        let reporter = sink.reporter();
                        let notifier = Arc::clone(&self.notifier);
                        thread::spawn(move || {
                            let _signal = guard;
                            let record =
                                task::run_task(&spec, style, &reporter, notifier.as_ref());
                            let _ = tx.send((step_idx, record));
                        });
                    }
                    Err(error) => {
                        sink.reporter().report(&name, error);
                        let _ = tx.send((step_idx, TaskRecord::unrun(name, template.clone())));
                        gate.done();
                    }
                }
            }
            drop(tx);

            gate.wait();
            let mut finished: Vec<(usize, TaskRecord)> = rx.iter().collect();
            finished.sort_by_key(|(step_idx, _)| *step_idx);
            self.tasks
                .extend(finished.into_iter().map(|(_, record)| record));
            debug!(stage = stage_idx, "stage drained");
        }

        let failures = sink.shutdown();
        if failures > 0 {
            warn!(failures, "run finished with task failures");
        }
        self.state = PlayState::Finished;
        info!("run finished");
        Ok(())
    }

    /// Completed task records in `(stage, step)` creation order.
    pub fn records(&self) -> &[TaskRecord] {
        &self.tasks
    }

    /// Persist every task's captured output under `root/<task name>/` as
    /// `stdout.log`, `stderr.log`, and `full.log`.
    ///
    /// One task's write failure is logged and skipped; the remaining tasks
    /// are still dumped.
    pub fn dump_logs(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)
            .with_context(|| format!("create log root {}", root.display()))?;
        for record in &self.tasks {
            if let Err(error) = dump_task_logs(record, root) {
                warn!(task = %record.name, error = %format!("{error:#}"), "failed to dump task logs");
            }
        }
        Ok(())
    }

    /// Per-task results in creation order, for the reporting collaborator.
    ///
    /// `logs_root` must match the directory handed to [`Play::dump_logs`];
    /// it is an explicit parameter rather than ambient process state.
    pub fn results(&self, logs_root: &Path) -> Vec<TaskResult> {
        self.tasks
            .iter()
            .map(|record| TaskResult {
                name: record.name.clone(),
                started_at: record.started_at.format(task::TIME_FORMAT).to_string(),
                ended_at: record.ended_at.format(task::TIME_FORMAT).to_string(),
                duration_ms: (record.ended_at - record.started_at).num_milliseconds(),
                success: record.success,
                command: record.command.clone(),
                log_path: logs_root.join(&record.name).join("full.log"),
            })
            .collect()
    }
}

/// One row of the final report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskResult {
    pub name: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: i64,
    pub success: bool,
    /// The rendered command, without the shell-invocation wrapper.
    pub command: String,
    pub log_path: PathBuf,
}

fn dump_task_logs(record: &TaskRecord, root: &Path) -> Result<()> {
    let dir = root.join(&record.name);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    for (file, contents) in [
        ("stdout.log", &record.stdout),
        ("stderr.log", &record.stderr),
        ("full.log", &record.combined),
    ] {
        let path = dir.join(file);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use std::time::Instant;

    fn stages(plan: &[&[&str]]) -> Vec<StageConfig> {
        plan.iter()
            .map(|steps| StageConfig {
                steps: steps.iter().map(|step| step.to_string()).collect(),
            })
            .collect()
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn run_plan(plan: &[&[&str]], vars_pairs: &[(&str, &str)]) -> Play {
        let mut play = Play::new(stages(plan), vars(vars_pairs), Arc::new(NoopNotifier));
        play.run(RunOptions::default()).expect("run");
        play
    }

    /// One record per step across all stages, in creation order.
    #[test]
    fn one_record_per_step_in_creation_order() {
        let play = run_plan(&[&["echo a", "echo b"], &["echo c"]], &[]);
        let names: Vec<&str> = play.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["0_0", "0_1", "1_0"]);
    }

    /// A later stage's task must start strictly after every earlier
    /// stage's task has ended.
    #[test]
    fn next_stage_waits_for_previous_stage_to_drain() {
        let play = run_plan(&[&["sleep 0.3"], &["true"]], &[]);
        let records = play.records();
        assert!(records[1].started_at >= records[0].ended_at);
    }

    /// Sibling outcomes are independent: one step failing does not stop or
    /// fail the others in the stage.
    #[test]
    fn failure_is_isolated_to_its_task() {
        let play = run_plan(&[&["exit 1", "true", "exit 7"]], &[]);
        let statuses: Vec<bool> = play.records().iter().map(|r| r.success).collect();
        assert_eq!(statuses, vec![false, true, false]);
    }

    /// Steps inside one stage run concurrently: two sleeps of D take about
    /// D of wall-clock, not 2×D.
    #[test]
    fn steps_within_a_stage_run_concurrently() {
        let start = Instant::now();
        run_plan(&[&["sleep 0.5", "sleep 0.5"]], &[]);
        let elapsed = start.elapsed();
        assert!(
            elapsed.as_secs_f64() < 0.9,
            "stage took {elapsed:?}, steps did not overlap"
        );
    }

    #[test]
    fn vars_are_substituted_into_commands() {
        let play = run_plan(&[&["echo hello {{target}}"]], &[("target", "world")]);
        let record = &play.records()[0];
        assert!(record.success);
        assert_eq!(record.command, "echo hello world");
        assert_eq!(record.stdout, "hello world\n");
    }

    /// A stage with one good step and one unrenderable step must not hang,
    /// and the bad step must still show up as a failed record.
    #[test]
    fn render_failure_does_not_hang_stage() {
        let play = run_plan(&[&["echo ok", "echo {{missing}}"]], &[]);
        let records = play.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert!(!records[1].success);
        assert_eq!(records[1].command, "echo {{missing}}");
        assert_eq!(records[1].started_at, records[1].ended_at);
    }

    /// Re-running the same plan (fresh Play, no side-effecting commands)
    /// yields the same statuses.
    #[test]
    fn rerun_yields_same_statuses() {
        let plan: &[&[&str]] = &[&["true", "exit 1"], &["echo done"]];
        let first: Vec<bool> = run_plan(plan, &[]).records().iter().map(|r| r.success).collect();
        let second: Vec<bool> = run_plan(plan, &[]).records().iter().map(|r| r.success).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![true, false, true]);
    }

    #[test]
    fn second_run_on_same_play_is_rejected() {
        let mut play = Play::new(stages(&[&["true"]]), HashMap::new(), Arc::new(NoopNotifier));
        play.run(RunOptions::default()).expect("first run");
        let err = play.run(RunOptions::default()).unwrap_err();
        assert!(err.to_string().contains("already finished"));
    }

    #[test]
    fn dump_logs_round_trips_captured_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let play = run_plan(&[&["echo weathered-rock", "echo rough >&2"]], &[]);
        play.dump_logs(temp.path()).expect("dump");

        let stdout = fs::read_to_string(temp.path().join("0_0/stdout.log")).expect("stdout.log");
        let full = fs::read_to_string(temp.path().join("0_0/full.log")).expect("full.log");
        assert_eq!(stdout, "weathered-rock\n");
        assert_eq!(full, "weathered-rock\n");

        let stderr = fs::read_to_string(temp.path().join("0_1/stderr.log")).expect("stderr.log");
        assert_eq!(stderr, "rough\n");
        assert!(temp.path().join("0_1/full.log").exists());
    }

    /// A task whose log directory cannot be created is skipped; the other
    /// tasks' logs are still written and the dump as a whole succeeds.
    #[test]
    fn dump_logs_skips_unwritable_task_and_keeps_going() {
        let temp = tempfile::tempdir().expect("tempdir");
        // A plain file where 0_0's directory should go.
        fs::write(temp.path().join("0_0"), "in the way").expect("write blocker");

        let play = run_plan(&[&["echo first", "echo second"]], &[]);
        play.dump_logs(temp.path()).expect("dump");

        let stdout = fs::read_to_string(temp.path().join("0_1/stdout.log")).expect("stdout.log");
        assert_eq!(stdout, "second\n");
        assert!(!temp.path().join("0_0/stdout.log").exists());
    }

    #[test]
    fn results_point_into_the_logs_root() {
        let play = run_plan(&[&["true"]], &[]);
        let results = play.results(Path::new("/tmp/stagehand_log"));
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].log_path,
            PathBuf::from("/tmp/stagehand_log/0_0/full.log")
        );
        assert!(results[0].success);
        assert_eq!(results[0].command, "true");
    }
}
