//! The run driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weft_block::handlers::{LoopPlan, ParallelPlan};
use weft_block::{BlockHandler, HandlerError, HandlerOutput, HandlerRegistry, HandlerScope, StreamingExecution};
use weft_core::{BlockId, ExecutionId, LoopId};
use weft_execution::{
    BlockLog, ExecutionContext, ExecutionOptions, ExecutionResult, ResponseScope, RunError,
    RunErrorKind, RunMetadata, RunStatus,
};
use weft_expression::Resolver;
use weft_workflow::{Block, BlockKind, HandleKind, Workflow, WorkflowGraph};

use crate::error::block_failure;
use crate::loops::{self, LoopRuntime};
use crate::parallel::{self, BranchOutcome, BranchSeed};
use crate::path;

/// Drives workflow runs to completion.
///
/// Construction is cheap; one executor serves any number of sequential or
/// concurrent runs. All per-run state lives in the run's own
/// [`ExecutionContext`].
pub struct Executor {
    registry: HandlerRegistry,
    options: ExecutionOptions,
    stream_sink: Option<mpsc::UnboundedSender<(BlockId, StreamingExecution)>>,
}

impl Executor {
    /// Create an executor over a handler registry.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            options: ExecutionOptions::default(),
            stream_sink: None,
        }
    }

    /// Replace the run options.
    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a sink for streaming block outputs. Without one, streaming
    /// envelopes are dropped after their execution value is recorded.
    #[must_use]
    pub fn with_stream_sink(
        mut self,
        sink: mpsc::UnboundedSender<(BlockId, StreamingExecution)>,
    ) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    /// Execute a workflow against an initial envelope.
    pub async fn run(
        &self,
        workflow: Workflow,
        envelope: Value,
        env: HashMap<String, String>,
    ) -> ExecutionResult {
        self.run_with_cancel(workflow, envelope, env, CancellationToken::new())
            .await
    }

    /// Execute with an external cancellation signal.
    ///
    /// No error escapes: every outcome, including structural rejection and
    /// cancellation, comes back as an [`ExecutionResult`].
    pub async fn run_with_cancel(
        &self,
        workflow: Workflow,
        envelope: Value,
        env: HashMap<String, String>,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let start_time = Utc::now();

        match workflow.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    warn!(%warning, "workflow validation warning");
                }
            }
            Err(err) => {
                let end_time = Utc::now();
                return ExecutionResult::failed(
                    RunError::new(RunErrorKind::InvalidWorkflow, err.to_string()),
                    Vec::new(),
                    RunMetadata::between(start_time, end_time),
                );
            }
        }

        let workflow = Arc::new(workflow);
        let mut ctx = ExecutionContext::new(ExecutionId::v4(), Arc::clone(&workflow), env);
        let _ = ctx.transition(RunStatus::Running);

        // Validation guarantees exactly one enabled starter.
        if let Some(starter) = workflow.starter() {
            ctx.activate(starter.id.clone());
        }

        let deadline = self.options.deadline.map(|d| Instant::now() + d);
        let mut loop_state = HashMap::new();
        let outcome = self
            .drive(
                &mut ctx,
                &mut loop_state,
                HashMap::new(),
                envelope,
                cancel,
                deadline,
            )
            .await;
        let end_time = Utc::now();
        let metadata = RunMetadata::between(start_time, end_time);

        match outcome {
            Ok(response) => {
                let output = response
                    .or_else(|| ctx.last_output().cloned())
                    .unwrap_or(Value::Null);
                let _ = ctx.transition(RunStatus::Completed);
                ExecutionResult::completed(output, std::mem::take(&mut ctx.block_logs), metadata)
            }
            Err(error) => {
                let terminal = match error.kind {
                    RunErrorKind::Cancelled => RunStatus::Cancelled,
                    RunErrorKind::LimitExceeded => RunStatus::LimitExceeded,
                    _ => RunStatus::Failed,
                };
                let _ = ctx.transition(terminal);
                ExecutionResult::failed(error, std::mem::take(&mut ctx.block_logs), metadata)
            }
        }
    }

    /// The layer loop. Runs one context to quiescence; parallel branches
    /// recurse into it with their own contexts.
    fn drive<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        loop_state: &'a mut HashMap<LoopId, LoopRuntime>,
        branch_vars: HashMap<String, Value>,
        envelope: Value,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> BoxFuture<'a, Result<Option<Value>, RunError>> {
        Box::pin(async move {
            let workflow = Arc::clone(&ctx.workflow);
            let graph = WorkflowGraph::new(&workflow);
            let loop_entries = loops::all_entry_members(&graph);
            let mut layers: u32 = 0;

            loop {
                if cancel.is_cancelled() {
                    return Err(RunError::new(RunErrorKind::Cancelled, "run cancelled"));
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(RunError::new(
                        RunErrorKind::LimitExceeded,
                        "wall-clock deadline exceeded",
                    ));
                }

                let mut ready: Vec<BlockId> = ctx
                    .active_execution_path
                    .iter()
                    .filter(|id| path::is_ready(ctx, &graph, id, &loop_entries))
                    .cloned()
                    .collect();
                ready.sort();

                if ready.is_empty() {
                    if self.advance_loops(ctx, &graph, loop_state)? {
                        continue;
                    }
                    return Ok(None);
                }
                if layers >= self.options.max_layers {
                    return Err(RunError::new(
                        RunErrorKind::LimitExceeded,
                        format!("layer cap of {} exceeded", self.options.max_layers),
                    ));
                }
                layers += 1;
                debug!(layer = layers, blocks = ?ready, "executing layer");

                let prepared = match self.prepare_layer(ctx, &graph, &ready, &branch_vars, &envelope)
                {
                    Ok(prepared) => prepared,
                    Err(error) => {
                        // Resolution failures are block failures; they get a
                        // failed activation record like any other.
                        let failed = error.block_id.as_ref().and_then(|id| {
                            ctx.workflow
                                .block(id)
                                .map(|b| (id.clone(), b.name.clone(), b.kind))
                        });
                        if let Some((id, name, kind)) = failed {
                            let now = Utc::now();
                            ctx.push_log(BlockLog::failure(
                                id,
                                name,
                                kind,
                                now,
                                now,
                                error.message.clone(),
                            ));
                        }
                        return Err(error);
                    }
                };
                let bound = self
                    .options
                    .concurrency
                    .unwrap_or(prepared.len())
                    .max(1);

                let mut in_flight: FuturesUnordered<BoxFuture<'_, FoldItem>> =
                    FuturesUnordered::new();
                let mut queue = prepared.into_iter();
                for dispatch in queue.by_ref().take(bound) {
                    in_flight.push(self.dispatch(dispatch, cancel.clone(), deadline));
                }

                let mut folded: Vec<FoldItem> = Vec::new();
                while let Some(item) = in_flight.next().await {
                    folded.push(item);
                    if let Some(dispatch) = queue.next() {
                        in_flight.push(self.dispatch(dispatch, cancel.clone(), deadline));
                    }
                }
                drop(in_flight);

                // Results of a cancelled layer are discarded.
                if cancel.is_cancelled() {
                    return Err(RunError::new(RunErrorKind::Cancelled, "run cancelled"));
                }

                let mut finished: Vec<BlockId> = Vec::new();
                let mut pending_response: Option<(BlockId, Value)> = None;
                let mut zero_iteration_loops: Vec<LoopId> = Vec::new();

                for item in folded {
                    self.fold_item(
                        ctx,
                        &graph,
                        loop_state,
                        item,
                        &mut finished,
                        &mut pending_response,
                        &mut zero_iteration_loops,
                    )?;
                }

                path::update_active_path(ctx, &graph, &finished);

                for lid in zero_iteration_loops {
                    self.complete_loop(ctx, &graph, &lid, loop_state);
                }

                if let Some((block_id, response)) = pending_response {
                    match self.settle_response(ctx, &graph, loop_state, &block_id, response)? {
                        Some(terminal) => return Ok(Some(terminal)),
                        None => continue,
                    }
                }
            }
        })
    }

    /// Snapshot the context and resolve inputs for every ready block.
    fn prepare_layer(
        &self,
        ctx: &ExecutionContext,
        graph: &WorkflowGraph<'_>,
        ready: &[BlockId],
        branch_vars: &HashMap<String, Value>,
        envelope: &Value,
    ) -> Result<Vec<Dispatch>, RunError> {
        let outputs: HashMap<BlockId, Value> = ctx
            .block_states
            .iter()
            .filter(|(_, state)| state.executed)
            .map(|(id, state)| (id.clone(), state.output.clone()))
            .collect();

        let mut dispatches = Vec::with_capacity(ready.len());
        for block_id in ready {
            let Some(block) = ctx.workflow.block(block_id) else {
                continue;
            };
            let handler = self.registry.resolve(block).ok_or_else(|| {
                RunError::new(
                    RunErrorKind::Handler,
                    format!("no handler registered for {} blocks", block.kind),
                )
                .with_block(block_id.clone())
            })?;

            let iteration = iteration_vars_for(ctx, block_id, branch_vars);
            let mut scope = HandlerScope::new(
                ctx.execution_id,
                Arc::clone(&ctx.workflow),
                ctx.environment.clone(),
            )
            .with_outputs(outputs.clone())
            .with_iteration(iteration);
            if block.kind == BlockKind::Condition {
                scope = scope.with_locals(condition_locals(ctx, graph, block_id));
            }

            let resolved = match block.kind {
                BlockKind::Starter => envelope.clone(),
                BlockKind::Loop | BlockKind::Parallel => Value::Null,
                _ => {
                    let resolver = Resolver::new(&scope);
                    match resolver.resolve_inputs(&block.params) {
                        Ok(map) => Value::Object(map),
                        Err(err) => {
                            return Err(RunError::new(
                                RunErrorKind::ReferenceResolution,
                                err.to_string(),
                            )
                            .with_block(block_id.clone()));
                        }
                    }
                }
            };

            let branch_seed = (block.kind == BlockKind::Parallel)
                .then(|| {
                    ctx.workflow
                        .parallels
                        .get(&parallel::parallel_id(block_id))
                        .map(|spec| BranchSeed::capture(ctx, spec))
                })
                .flatten();

            dispatches.push(Dispatch {
                block: block.clone(),
                handler,
                resolved,
                scope,
                branch_seed,
            });
        }
        Ok(dispatches)
    }

    /// Execute one prepared block (or a whole parallel subflow).
    fn dispatch<'a>(
        &'a self,
        dispatch: Dispatch,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> BoxFuture<'a, FoldItem> {
        Box::pin(async move {
            let Dispatch {
                block,
                handler,
                resolved,
                scope,
                branch_seed,
            } = dispatch;
            let started_at = Utc::now();

            let outcome = if let Some(seed) = branch_seed {
                // Containers first resolve their plan, then fan out.
                match handler
                    .execute(&block, resolved, &scope, cancel.clone())
                    .await
                {
                    Ok(plan_output) => {
                        let plan_value = plan_output.execution_value().clone();
                        match serde_json::from_value::<ParallelPlan>(plan_value.clone()) {
                            Ok(plan) => Outcome::Parallel(
                                self.run_branches(seed, &block.id, plan, plan_value, &cancel, deadline)
                                    .await,
                            ),
                            Err(e) => Outcome::Handler(Err(HandlerError::fatal(format!(
                                "parallel plan did not resolve: {e}"
                            )))),
                        }
                    }
                    Err(err) => Outcome::Handler(Err(err)),
                }
            } else {
                Outcome::Handler(handler.execute(&block, resolved, &scope, cancel).await)
            };

            FoldItem {
                block_id: block.id.clone(),
                block_name: block.name.clone(),
                block_kind: block.kind,
                started_at,
                ended_at: Utc::now(),
                outcome,
            }
        })
    }

    /// Fold one completed dispatch into the context.
    #[allow(clippy::too_many_arguments)]
    fn fold_item(
        &self,
        ctx: &mut ExecutionContext,
        graph: &WorkflowGraph<'_>,
        loop_state: &mut HashMap<LoopId, LoopRuntime>,
        item: FoldItem,
        finished: &mut Vec<BlockId>,
        pending_response: &mut Option<(BlockId, Value)>,
        zero_iteration_loops: &mut Vec<LoopId>,
    ) -> Result<(), RunError> {
        let FoldItem {
            block_id,
            block_name,
            block_kind,
            started_at,
            ended_at,
            outcome,
        } = item;
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;

        match outcome {
            Outcome::Handler(Ok(output)) => {
                let value = output.execution_value().clone();
                validate_decision_output(graph, &block_id, block_kind, &value)?;

                if let HandlerOutput::Stream(envelope) = output {
                    match &self.stream_sink {
                        Some(sink) => {
                            let _ = sink.send((block_id.clone(), envelope));
                        }
                        None => {
                            debug!(block = %block_id, "dropping streaming envelope: no sink");
                        }
                    }
                }

                if block_kind == BlockKind::Loop {
                    let plan =
                        serde_json::from_value::<LoopPlan>(value.clone()).map_err(|e| {
                            RunError::new(
                                RunErrorKind::Handler,
                                format!("loop plan did not resolve: {e}"),
                            )
                            .with_block(block_id.clone())
                        })?;
                    let lid = LoopId::new(block_id.as_str());
                    if plan.total == 0 {
                        zero_iteration_loops.push(lid.clone());
                    }
                    ctx.loop_iterations.insert(lid.clone(), 0);
                    let runtime = LoopRuntime::new(plan);
                    ctx.loop_items.insert(lid.clone(), runtime.item_for(0));
                    loop_state.insert(lid, runtime);
                }

                ctx.record_output(block_id.clone(), value.clone(), duration_ms);
                ctx.push_log(BlockLog::success(
                    block_id.clone(),
                    block_name,
                    block_kind,
                    started_at,
                    ended_at,
                    &value,
                ));
                if block_kind == BlockKind::Response {
                    pending_response.get_or_insert((block_id.clone(), value));
                }
                finished.push(block_id);
                Ok(())
            }
            Outcome::Handler(Err(err)) => {
                ctx.push_log(BlockLog::failure(
                    block_id.clone(),
                    block_name,
                    block_kind,
                    started_at,
                    ended_at,
                    err.to_string(),
                ));
                Err(block_failure(&block_id, &err))
            }
            Outcome::Parallel(Ok(done)) => {
                for log in done.logs {
                    ctx.push_log(log);
                }
                ctx.record_output(block_id.clone(), done.output.clone(), duration_ms);
                ctx.completed_parallels
                    .insert(parallel::parallel_id(&block_id));
                ctx.push_log(BlockLog::success(
                    block_id.clone(),
                    block_name,
                    block_kind,
                    started_at,
                    ended_at,
                    &done.output,
                ));
                path::activate_boundary_exit(ctx, graph, &block_id, HandleKind::ParallelEnd);
                if let Some(response) = done.response {
                    pending_response.get_or_insert((block_id.clone(), response));
                }
                finished.push(block_id);
                Ok(())
            }
            Outcome::Parallel(Err(error)) => {
                ctx.push_log(BlockLog::failure(
                    block_id.clone(),
                    block_name,
                    block_kind,
                    started_at,
                    ended_at,
                    error.to_string(),
                ));
                Err(error)
            }
        }
    }

    /// Run every branch of a parallel container to quiescence.
    async fn run_branches(
        &self,
        seed: BranchSeed,
        container: &BlockId,
        plan: ParallelPlan,
        plan_value: Value,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<ParallelDone, RunError> {
        let branch_cancel = cancel.child_token();
        let total = plan.total;
        let bound = self
            .options
            .concurrency
            .unwrap_or(total as usize)
            .max(1);

        let nodes = seed
            .workflow
            .parallels
            .get(&parallel::parallel_id(container))
            .map(|spec| spec.nodes.clone())
            .unwrap_or_default();

        let mut in_flight: FuturesUnordered<BoxFuture<'_, BranchOutcome>> =
            FuturesUnordered::new();
        let mut queue = 0..total;
        let spawn = |index: u32| {
            let seed = seed.clone();
            let plan_value = plan_value.clone();
            let container = container.clone();
            let nodes = nodes.clone();
            let item = plan
                .items
                .as_ref()
                .and_then(|items| items.get(index as usize))
                .cloned();
            let cancel = branch_cancel.clone();
            let branch: BoxFuture<'_, BranchOutcome> = Box::pin(async move {
                let mut branch_ctx = seed.branch_context(&container, &plan_value);
                let mut branch_loops = HashMap::new();
                let vars = parallel::branch_vars(index, item.as_ref());
                let drove = self
                    .drive(
                        &mut branch_ctx,
                        &mut branch_loops,
                        vars,
                        Value::Null,
                        cancel,
                        deadline,
                    )
                    .await;
                match drove {
                    Ok(response) => {
                        let graph = WorkflowGraph::new(&seed.workflow);
                        let entries = parallel::entry_members(&graph, &container);
                        let value =
                            loops::iteration_result(&branch_ctx, &graph, &nodes, &entries);
                        BranchOutcome {
                            index,
                            result: Ok(value),
                            logs: std::mem::take(&mut branch_ctx.block_logs),
                            response,
                        }
                    }
                    Err(error) => BranchOutcome {
                        index,
                        result: Err(error),
                        logs: std::mem::take(&mut branch_ctx.block_logs),
                        response: None,
                    },
                }
            });
            branch
        };

        for index in queue.by_ref().take(bound) {
            in_flight.push(spawn(index));
        }

        let mut outcomes: Vec<BranchOutcome> = Vec::with_capacity(total as usize);
        // Under fail-fast the error to surface is the one that tripped the
        // cancellation, in completion order; later Cancelled results are
        // fallout, not the cause.
        let mut trigger_error: Option<RunError> = None;
        while let Some(outcome) = in_flight.next().await {
            if let Err(error) = &outcome.result
                && self.options.fail_fast
            {
                if trigger_error.is_none() {
                    trigger_error = Some(error.clone());
                }
                branch_cancel.cancel();
            }
            outcomes.push(outcome);
            if let Some(index) = queue.next() {
                in_flight.push(spawn(index));
            }
        }
        outcomes.sort_by_key(|o| o.index);

        let mut slots = Vec::with_capacity(outcomes.len());
        let mut logs = Vec::new();
        let mut response = None;
        let mut first_error: Option<RunError> = None;
        let mut any_success = false;
        for outcome in outcomes {
            logs.extend(outcome.logs);
            match outcome.result {
                Ok(value) => {
                    any_success = true;
                    slots.push(value);
                }
                Err(error) => {
                    slots.push(parallel::error_slot(&error));
                    first_error.get_or_insert(error);
                }
            }
            if response.is_none() {
                response = outcome.response;
            }
        }

        if self.options.fail_fast
            && let Some(error) = trigger_error
        {
            return Err(error);
        }
        if !any_success
            && let Some(error) = first_error.take()
        {
            return Err(error);
        }

        Ok(ParallelDone {
            output: parallel::aggregate_output(&slots),
            logs,
            response,
        })
    }

    /// When the ready layer is empty, try to advance one quiesced loop.
    fn advance_loops(
        &self,
        ctx: &mut ExecutionContext,
        graph: &WorkflowGraph<'_>,
        loop_state: &mut HashMap<LoopId, LoopRuntime>,
    ) -> Result<bool, RunError> {
        let entered: Vec<LoopId> = loop_state
            .keys()
            .filter(|lid| !ctx.completed_loops.contains(*lid))
            .cloned()
            .collect();

        for lid in entered {
            let container = lid.as_block_id();
            let Some(spec) = ctx.workflow.loops.get(&lid).cloned() else {
                continue;
            };
            let entries = loops::entry_members(graph, &container);
            if !loops::iteration_quiesced(ctx, graph, &spec.nodes, &entries) {
                continue;
            }

            let result = loops::iteration_result(ctx, graph, &spec.nodes, &entries);
            let Some(runtime) = loop_state.get_mut(&lid) else {
                continue;
            };
            runtime.results.push(result);

            let next = ctx.loop_iterations.get(&lid).copied().unwrap_or(0) + 1;
            if next < runtime.plan.total {
                let item = runtime.item_for(next);
                debug!(%lid, iteration = next, "loop advances");
                loops::reset_members(ctx, &spec.nodes);
                ctx.loop_iterations.insert(lid.clone(), next);
                ctx.loop_items.insert(lid.clone(), item);
                path::activate_boundary_entry(ctx, graph, &container, HandleKind::LoopStart);
            } else {
                self.complete_loop(ctx, graph, &lid, loop_state);
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Finish a loop: record the aggregate output, retire the members, open
    /// the `loop-end` boundary.
    fn complete_loop(
        &self,
        ctx: &mut ExecutionContext,
        graph: &WorkflowGraph<'_>,
        lid: &LoopId,
        loop_state: &mut HashMap<LoopId, LoopRuntime>,
    ) {
        let container = lid.as_block_id();
        let Some(runtime) = loop_state.get(lid) else {
            return;
        };
        debug!(%lid, iterations = runtime.plan.total, "loop completed");
        let output = runtime.aggregate_output();
        ctx.record_output(container.clone(), output, 0);
        ctx.completed_loops.insert(lid.clone());
        if let Some(spec) = ctx.workflow.loops.get(lid) {
            let members: Vec<BlockId> = spec.nodes.iter().cloned().collect();
            ctx.deactivate(members.iter());
        }
        path::activate_boundary_exit(ctx, graph, &container, HandleKind::LoopEnd);
    }

    /// Decide what a fired response terminates.
    ///
    /// Returns `Some(output)` when the run ends now, `None` when the
    /// response was scoped to an iteration or loop and the run continues.
    fn settle_response(
        &self,
        ctx: &mut ExecutionContext,
        graph: &WorkflowGraph<'_>,
        loop_state: &mut HashMap<LoopId, LoopRuntime>,
        block_id: &BlockId,
        response: Value,
    ) -> Result<Option<Value>, RunError> {
        let enclosing = ctx
            .workflow
            .loop_containing(block_id)
            .map(|(lid, _)| lid.clone())
            .filter(|lid| !ctx.completed_loops.contains(lid) && loop_state.contains_key(lid));

        let Some(lid) = enclosing else {
            return Ok(Some(response));
        };

        match self.options.response_scope {
            ResponseScope::Run => Ok(Some(response)),
            ResponseScope::Loop => {
                let container = lid.as_block_id();
                let spec = ctx.workflow.loops.get(&lid).cloned();
                if let (Some(spec), Some(runtime)) = (spec, loop_state.get_mut(&lid)) {
                    let entries = loops::entry_members(graph, &container);
                    runtime
                        .results
                        .push(loops::iteration_result(ctx, graph, &spec.nodes, &entries));
                }
                self.complete_loop(ctx, graph, &lid, loop_state);
                Ok(None)
            }
            ResponseScope::Iteration => {
                // Short-circuit: pretend the rest of the iteration ran.
                let container = lid.as_block_id();
                let spec = ctx.workflow.loops.get(&lid).cloned();
                let Some(spec) = spec else {
                    return Ok(Some(response));
                };
                let entries = loops::entry_members(graph, &container);
                let result = loops::iteration_result(ctx, graph, &spec.nodes, &entries);
                let Some(runtime) = loop_state.get_mut(&lid) else {
                    return Ok(Some(response));
                };
                runtime.results.push(result);
                let next = ctx.loop_iterations.get(&lid).copied().unwrap_or(0) + 1;
                if next < runtime.plan.total {
                    let item = runtime.item_for(next);
                    loops::reset_members(ctx, &spec.nodes);
                    ctx.loop_iterations.insert(lid.clone(), next);
                    ctx.loop_items.insert(lid.clone(), item);
                    path::activate_boundary_entry(ctx, graph, &container, HandleKind::LoopStart);
                } else {
                    self.complete_loop(ctx, graph, &lid, loop_state);
                }
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// One block prepared for execution.
struct Dispatch {
    block: Block,
    handler: std::sync::Arc<dyn BlockHandler>,
    resolved: Value,
    scope: HandlerScope,
    branch_seed: Option<BranchSeed>,
}

/// What came back from a dispatch.
enum Outcome {
    Handler(Result<HandlerOutput, HandlerError>),
    Parallel(Result<ParallelDone, RunError>),
}

/// A completed parallel subflow.
struct ParallelDone {
    output: Value,
    logs: Vec<BlockLog>,
    response: Option<Value>,
}

/// A dispatch result ready to fold.
struct FoldItem {
    block_id: BlockId,
    block_name: String,
    block_kind: BlockKind,
    started_at: chrono::DateTime<Utc>,
    ended_at: chrono::DateTime<Utc>,
    outcome: Outcome,
}

/// Iteration variables for a block: the innermost entered loop wins,
/// otherwise the enclosing parallel branch's variables apply.
fn iteration_vars_for(
    ctx: &ExecutionContext,
    block_id: &BlockId,
    branch_vars: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    if let Some((lid, _)) = ctx.workflow.loop_containing(block_id)
        && let Some(k) = ctx.loop_iterations.get(lid)
    {
        let item = ctx.loop_items.get(lid).cloned().unwrap_or(Value::Null);
        return loops::iteration_vars(*k, &item);
    }
    branch_vars.clone()
}

/// The implicit upstream scope a condition block's bare identifiers read.
///
/// With several executed predecessors the most recently completed one wins
/// (validation already warned about the ambiguity).
fn condition_locals(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    block_id: &BlockId,
) -> HashMap<String, Value> {
    let mut best: Option<(usize, &Value)> = None;
    for conn in graph.incoming(block_id) {
        let Some(output) = ctx.output_of(&conn.source) else {
            continue;
        };
        let position = ctx
            .block_logs
            .iter()
            .rposition(|log| log.block_id == conn.source)
            .unwrap_or(0);
        if best.is_none_or(|(p, _)| position >= p) {
            best = Some((position, output));
        }
    }

    let mut locals = HashMap::new();
    if let Some((_, output)) = best {
        locals.insert("value".to_owned(), output.clone());
        if let Value::String(text) = output {
            locals.insert("text".to_owned(), Value::String(text.clone()));
        }
        if let Value::Object(map) = output {
            for (key, value) in map {
                locals.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    locals
}

/// Decision outputs must carry their selection before they gate the path.
fn validate_decision_output(
    graph: &WorkflowGraph<'_>,
    block_id: &BlockId,
    kind: BlockKind,
    output: &Value,
) -> Result<(), RunError> {
    match kind {
        BlockKind::Router => {
            let target = output
                .pointer("/selectedPath/blockId")
                .and_then(Value::as_str);
            let Some(target) = target else {
                return Err(RunError::new(
                    RunErrorKind::RouterSelection,
                    "router output lacks selectedPath.blockId",
                )
                .with_block(block_id.clone()));
            };
            if !graph.has_edge(block_id, &BlockId::new(target)) {
                return Err(RunError::new(
                    RunErrorKind::RouterSelection,
                    format!("router selected {target}, which is not a direct successor"),
                )
                .with_block(block_id.clone()));
            }
            Ok(())
        }
        BlockKind::Condition => {
            if output.get("selectedConditionId").and_then(Value::as_str).is_none() {
                return Err(RunError::new(
                    RunErrorKind::Evaluation,
                    "condition output lacks selectedConditionId",
                )
                .with_block(block_id.clone()));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
