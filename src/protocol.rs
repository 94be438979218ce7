//! DAP protocol message types.
//!
//! The core lifecycle, execution-control, and inspection messages of the
//! Debug Adapter Protocol, declared through [`schema_struct!`](crate::schema_struct).
//! Request schema names are the protocol `command` strings; event schema
//! names are the `event` strings. The full generated catalog of the
//! protocol specification is much larger; this is the working subset a
//! client or adapter needs to drive a debug session.

use crate::value::Value;

// ---------------------------------------------------------------------------
// Shared structures
// ---------------------------------------------------------------------------

crate::schema_struct! {
    /// A source file referenced by requests, responses, and events.
    pub struct Source = "Source" {
        /// Short name of the source.
        name "name": Option<String>,
        /// File system path.
        path "path": Option<String>,
        /// Reference for sources without a file path.
        source_reference "sourceReference": Option<i64>,
    }
}

crate::schema_struct! {
    /// A breakpoint location as requested by the client.
    pub struct SourceBreakpoint = "SourceBreakpoint" {
        /// The source line of the breakpoint.
        line "line": i64,
        /// Optional column.
        column "column": Option<i64>,
        /// Expression that must evaluate to true to stop.
        condition "condition": Option<String>,
        /// Hit-count expression.
        hit_condition "hitCondition": Option<String>,
        /// Log message for logpoints.
        log_message "logMessage": Option<String>,
    }
}

crate::schema_struct! {
    /// A breakpoint as resolved by the adapter.
    pub struct Breakpoint = "Breakpoint" {
        /// Adapter-assigned identifier.
        id "id": Option<i64>,
        /// Whether the breakpoint could be set.
        verified "verified": bool,
        /// Explanation when unverified.
        message "message": Option<String>,
        /// Resolved source.
        source "source": Option<Source>,
        /// Resolved line.
        line "line": Option<i64>,
        /// Resolved column.
        column "column": Option<i64>,
    }
}

crate::schema_struct! {
    /// A thread in the debuggee.
    pub struct Thread = "Thread" {
        /// Unique thread identifier.
        id "id": i64,
        /// Human-readable name.
        name "name": String,
    }
}

crate::schema_struct! {
    /// One frame of a call stack.
    pub struct StackFrame = "StackFrame" {
        /// Frame identifier, usable in `scopes` requests.
        id "id": i64,
        /// Function or frame name.
        name "name": String,
        /// Source location.
        source "source": Option<Source>,
        /// Line within the source.
        line "line": i64,
        /// Column within the source.
        column "column": i64,
        /// Module the frame belongs to.
        module_id "moduleId": Option<Value>,
    }
}

crate::schema_struct! {
    /// A named container of variables.
    pub struct Scope = "Scope" {
        /// Scope name, e.g. "Locals".
        name "name": String,
        /// Reference usable in `variables` requests.
        variables_reference "variablesReference": i64,
        /// Whether fetching the scope is expensive.
        expensive "expensive": Option<bool>,
    }
}

crate::schema_struct! {
    /// A named value shown in the variables view.
    pub struct Variable = "Variable" {
        /// Variable name.
        name "name": String,
        /// Rendered value.
        value "value": String,
        /// Type name, when known.
        variable_type "type": Option<String>,
        /// If greater than zero, children are fetched via this reference.
        variables_reference "variablesReference": Option<i64>,
    }
}

// ---------------------------------------------------------------------------
// Lifecycle requests
// ---------------------------------------------------------------------------

crate::schema_struct! {
    /// The first request of every session; negotiates capabilities.
    pub struct InitializeRequest = "initialize" {
        /// Identifier of the client.
        client_id "clientID": Option<String>,
        /// Human-readable client name.
        client_name "clientName": Option<String>,
        /// Identifier of the debug adapter.
        adapter_id "adapterID": String,
        /// Client locale, e.g. "en-US".
        locale "locale": Option<String>,
        /// Whether line numbers are one-based.
        lines_start_at1 "linesStartAt1": Option<bool>,
        /// Whether column numbers are one-based.
        columns_start_at1 "columnsStartAt1": Option<bool>,
        /// "path" or "uri".
        path_format "pathFormat": Option<String>,
        /// The client renders variable types.
        supports_variable_type "supportsVariableType": Option<bool>,
        /// The client pages variables.
        supports_variable_paging "supportsVariablePaging": Option<bool>,
        /// The client answers `runInTerminal` requests.
        supports_run_in_terminal_request "supportsRunInTerminalRequest": Option<bool>,
    }
}

crate::schema_struct! {
    /// The capability set a debug adapter announces.
    pub struct Capabilities = "Capabilities" {
        /// The adapter supports `configurationDone`.
        supports_configuration_done_request "supportsConfigurationDoneRequest": Option<bool>,
        /// The adapter supports conditional breakpoints.
        supports_conditional_breakpoints "supportsConditionalBreakpoints": Option<bool>,
        /// The adapter supports hit-count breakpoints.
        supports_hit_conditional_breakpoints "supportsHitConditionalBreakpoints": Option<bool>,
        /// The adapter supports `evaluate` for hovers.
        supports_evaluate_for_hovers "supportsEvaluateForHovers": Option<bool>,
        /// The adapter supports stepping backwards.
        supports_step_back "supportsStepBack": Option<bool>,
        /// The adapter supports setting variable values.
        supports_set_variable "supportsSetVariable": Option<bool>,
        /// The adapter supports the `terminate` request.
        supports_terminate_request "supportsTerminateRequest": Option<bool>,
    }
}

/// The `initialize` response body is the adapter's capability set.
pub type InitializeResponse = Capabilities;

crate::schema_request!(InitializeRequest => InitializeResponse);

crate::schema_struct! {
    /// Start the debuggee.
    pub struct LaunchRequest = "launch" {
        /// Run without debugging.
        no_debug "noDebug": Option<bool>,
        /// Opaque restart data from a previous session.
        restart "__restart": Option<Value>,
        /// Program to launch.
        program "program": Option<String>,
        /// Command-line arguments.
        args "args": Option<Vec<String>>,
        /// Working directory for the debuggee.
        cwd "cwd": Option<String>,
        /// Stop at the program entry point.
        stop_on_entry "stopOnEntry": Option<bool>,
    }
}

crate::schema_struct! {
    /// Acknowledges `launch`.
    pub struct LaunchResponse = "launch" {}
}

crate::schema_request!(LaunchRequest => LaunchResponse);

crate::schema_struct! {
    /// Attach to an already running debuggee.
    pub struct AttachRequest = "attach" {
        /// Opaque restart data from a previous session.
        restart "__restart": Option<Value>,
        /// Process to attach to.
        process_id "processId": Option<i64>,
    }
}

crate::schema_struct! {
    /// Acknowledges `attach`.
    pub struct AttachResponse = "attach" {}
}

crate::schema_request!(AttachRequest => AttachResponse);

crate::schema_struct! {
    /// Signals that configuration (breakpoints etc.) is complete.
    pub struct ConfigurationDoneRequest = "configurationDone" {}
}

crate::schema_struct! {
    /// Acknowledges `configurationDone`.
    pub struct ConfigurationDoneResponse = "configurationDone" {}
}

crate::schema_request!(ConfigurationDoneRequest => ConfigurationDoneResponse);

crate::schema_struct! {
    /// End the session, optionally terminating the debuggee.
    pub struct DisconnectRequest = "disconnect" {
        /// The client intends to restart.
        restart "restart": Option<bool>,
        /// Terminate the debuggee.
        terminate_debuggee "terminateDebuggee": Option<bool>,
        /// Suspend the debuggee instead of terminating it.
        suspend_debuggee "suspendDebuggee": Option<bool>,
    }
}

crate::schema_struct! {
    /// Acknowledges `disconnect`.
    pub struct DisconnectResponse = "disconnect" {}
}

crate::schema_request!(DisconnectRequest => DisconnectResponse);

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

crate::schema_struct! {
    /// Replace all breakpoints of one source file.
    pub struct SetBreakpointsRequest = "setBreakpoints" {
        /// The source to set breakpoints in.
        source "source": Source,
        /// The breakpoints to set.
        breakpoints "breakpoints": Option<Vec<SourceBreakpoint>>,
        /// The source has been modified since the last request.
        source_modified "sourceModified": Option<bool>,
    }
}

crate::schema_struct! {
    /// The resolved breakpoints, in request order.
    pub struct SetBreakpointsResponse = "setBreakpoints" {
        /// Resolution result for every requested breakpoint.
        breakpoints "breakpoints": Vec<Breakpoint>,
    }
}

crate::schema_request!(SetBreakpointsRequest => SetBreakpointsResponse);

// ---------------------------------------------------------------------------
// Execution control
// ---------------------------------------------------------------------------

crate::schema_struct! {
    /// Resume execution.
    pub struct ContinueRequest = "continue" {
        /// The thread to resume.
        thread_id "threadId": i64,
        /// Resume only this thread.
        single_thread "singleThread": Option<bool>,
    }
}

crate::schema_struct! {
    /// Acknowledges `continue`.
    pub struct ContinueResponse = "continue" {
        /// Whether all threads were resumed.
        all_threads_continued "allThreadsContinued": Option<bool>,
    }
}

crate::schema_request!(ContinueRequest => ContinueResponse);

crate::schema_struct! {
    /// Step over the current line.
    pub struct NextRequest = "next" {
        /// The thread to step.
        thread_id "threadId": i64,
        /// Stepping granularity.
        granularity "granularity": Option<String>,
    }
}

crate::schema_struct! {
    /// Acknowledges `next`.
    pub struct NextResponse = "next" {}
}

crate::schema_request!(NextRequest => NextResponse);

crate::schema_struct! {
    /// Step into the current call.
    pub struct StepInRequest = "stepIn" {
        /// The thread to step.
        thread_id "threadId": i64,
        /// Target to step into, when several are possible.
        target_id "targetId": Option<i64>,
        /// Stepping granularity.
        granularity "granularity": Option<String>,
    }
}

crate::schema_struct! {
    /// Acknowledges `stepIn`.
    pub struct StepInResponse = "stepIn" {}
}

crate::schema_request!(StepInRequest => StepInResponse);

crate::schema_struct! {
    /// Run until the current frame returns.
    pub struct StepOutRequest = "stepOut" {
        /// The thread to step.
        thread_id "threadId": i64,
        /// Stepping granularity.
        granularity "granularity": Option<String>,
    }
}

crate::schema_struct! {
    /// Acknowledges `stepOut`.
    pub struct StepOutResponse = "stepOut" {}
}

crate::schema_request!(StepOutRequest => StepOutResponse);

crate::schema_struct! {
    /// Suspend a running thread.
    pub struct PauseRequest = "pause" {
        /// The thread to pause.
        thread_id "threadId": i64,
    }
}

crate::schema_struct! {
    /// Acknowledges `pause`.
    pub struct PauseResponse = "pause" {}
}

crate::schema_request!(PauseRequest => PauseResponse);

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

crate::schema_struct! {
    /// List the debuggee's threads.
    pub struct ThreadsRequest = "threads" {}
}

crate::schema_struct! {
    /// The debuggee's threads.
    pub struct ThreadsResponse = "threads" {
        /// All threads.
        threads "threads": Vec<Thread>,
    }
}

crate::schema_request!(ThreadsRequest => ThreadsResponse);

crate::schema_struct! {
    /// Fetch a slice of a thread's call stack.
    pub struct StackTraceRequest = "stackTrace" {
        /// The thread to inspect.
        thread_id "threadId": i64,
        /// Index of the first frame to return.
        start_frame "startFrame": Option<i64>,
        /// Maximum number of frames.
        levels "levels": Option<i64>,
    }
}

crate::schema_struct! {
    /// A slice of the call stack.
    pub struct StackTraceResponse = "stackTrace" {
        /// The frames, topmost first.
        stack_frames "stackFrames": Vec<StackFrame>,
        /// Total number of frames available.
        total_frames "totalFrames": Option<i64>,
    }
}

crate::schema_request!(StackTraceRequest => StackTraceResponse);

crate::schema_struct! {
    /// List the scopes of a stack frame.
    pub struct ScopesRequest = "scopes" {
        /// The frame to inspect.
        frame_id "frameId": i64,
    }
}

crate::schema_struct! {
    /// The scopes of the requested frame.
    pub struct ScopesResponse = "scopes" {
        /// The scopes, most specific first.
        scopes "scopes": Vec<Scope>,
    }
}

crate::schema_request!(ScopesRequest => ScopesResponse);

crate::schema_struct! {
    /// Fetch the children of a variables reference.
    pub struct VariablesRequest = "variables" {
        /// The reference to expand.
        variables_reference "variablesReference": i64,
    }
}

crate::schema_struct! {
    /// The resolved variables.
    pub struct VariablesResponse = "variables" {
        /// Child variables.
        variables "variables": Vec<Variable>,
    }
}

crate::schema_request!(VariablesRequest => VariablesResponse);

crate::schema_struct! {
    /// Evaluate an expression in a frame's context.
    pub struct EvaluateRequest = "evaluate" {
        /// The expression to evaluate.
        expression "expression": String,
        /// Frame providing the evaluation context.
        frame_id "frameId": Option<i64>,
        /// "watch", "repl", "hover", or "clipboard".
        context "context": Option<String>,
    }
}

crate::schema_struct! {
    /// The evaluation result.
    pub struct EvaluateResponse = "evaluate" {
        /// Rendered result.
        result "result": String,
        /// Type of the result.
        result_type "type": Option<String>,
        /// If greater than zero, children are fetched via this reference.
        variables_reference "variablesReference": Option<i64>,
    }
}

crate::schema_request!(EvaluateRequest => EvaluateResponse);

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

crate::schema_struct! {
    /// The adapter is ready to accept configuration requests.
    pub struct InitializedEvent = "initialized" {}
}

crate::schema_event!(InitializedEvent);

crate::schema_struct! {
    /// The debuggee stopped.
    pub struct StoppedEvent = "stopped" {
        /// Why execution stopped: "step", "breakpoint", "exception",
        /// "pause", "entry", …
        reason "reason": String,
        /// Human-readable description of the stop.
        description "description": Option<String>,
        /// The thread that stopped.
        thread_id "threadId": Option<i64>,
        /// Whether all threads are stopped.
        all_threads_stopped "allThreadsStopped": Option<bool>,
        /// Additional details, e.g. the exception text.
        text "text": Option<String>,
    }
}

crate::schema_event!(StoppedEvent);

crate::schema_struct! {
    /// The debuggee exited.
    pub struct ExitedEvent = "exited" {
        /// The debuggee's exit code.
        exit_code "exitCode": i64,
    }
}

crate::schema_event!(ExitedEvent);

crate::schema_struct! {
    /// The debug session ended.
    pub struct TerminatedEvent = "terminated" {
        /// When present, the client should restart with this data.
        restart "restart": Option<Value>,
    }
}

crate::schema_event!(TerminatedEvent);

crate::schema_struct! {
    /// The debuggee produced output.
    pub struct OutputEvent = "output" {
        /// "console", "stdout", "stderr", or "telemetry".
        category "category": Option<String>,
        /// The output text.
        output "output": String,
        /// Source location that produced the output.
        source "source": Option<Source>,
        /// Line in the source.
        line "line": Option<i64>,
        /// Column in the source.
        column "column": Option<i64>,
    }
}

crate::schema_event!(OutputEvent);

crate::schema_struct! {
    /// A thread started or exited.
    pub struct ThreadEvent = "thread" {
        /// "started" or "exited".
        reason "reason": String,
        /// The thread in question.
        thread_id "threadId": i64,
    }
}

crate::schema_event!(ThreadEvent);
