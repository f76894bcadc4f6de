//! Debug session state and protocol dispatch
//!
//! The session sits between two parties. The protocol client talks to it
//! through [`DebugSession::handle`] (usually via the HTTP listener). The
//! executor calls [`DebugSession::on_instruction`] before running a mapped
//! instruction and [`DebugSession::on_exception`] when a value is thrown.
//! Once either returns `true`, the executor must wait until
//! [`DebugSession::is_paused`] turns false and then carry on with the same
//! instruction.

use std::collections::VecDeque;
use std::sync::Arc;

use heron_bytecode::{CacheStore, Position, Program, SourceFile};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ProtocolError;
use crate::protocol::debugger::{
    BreakLocation, BreakpointId, BreakpointResolvedEvent, CallFrame, CallFrameId, EnableResult,
    EvaluateOnCallFrameParams, EvaluateOnCallFrameResult, GetPossibleBreakpointsParams,
    GetPossibleBreakpointsResult, GetScriptSourceParams, GetScriptSourceResult, Location,
    PauseOnExceptionsState, PausedEvent, PausedReason, RemoveBreakpointParams,
    ScriptParsedEvent, SetBreakpointByUrlParams, SetBreakpointByUrlResult, SetBreakpointParams,
    SetBreakpointResult, SetPauseOnExceptionsParams,
};
use crate::protocol::runtime::{
    ExceptionDetails, GetPropertiesParams, GetPropertiesResult, PropertyDescriptor, RemoteObject,
    RemoteObjectId, RemoteObjectType, ScriptId, UnserializableValue,
};
use crate::protocol::{DrainEventsResult, Empty, Event, Request, Response};

/// Executor services the session needs to answer inspection commands
pub trait RuntimeHost {
    /// Evaluate `expression` in the scope of a paused frame
    fn evaluate(
        &mut self,
        frame: &CallFrameId,
        expression: &str,
    ) -> Result<RemoteObject, ExceptionDetails>;

    /// Properties of a remote object, or `None` if the handle is unknown
    fn get_properties(
        &mut self,
        object: &RemoteObjectId,
        own_properties: bool,
    ) -> Option<Vec<PropertyDescriptor>>;
}

/// Host for sessions with no executor behind them, e.g. inspecting a cache file
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedHost;

impl RuntimeHost for DetachedHost {
    fn evaluate(&mut self, _: &CallFrameId, _: &str) -> Result<RemoteObject, ExceptionDetails> {
        Err(ExceptionDetails::message("no executor attached"))
    }

    fn get_properties(&mut self, _: &RemoteObjectId, _: bool) -> Option<Vec<PropertyDescriptor>> {
        None
    }
}

/// Session shared between the listener and the executor
pub type SharedSession<H> = Arc<Mutex<DebugSession<H>>>;

/// Where the executor currently is
#[derive(Debug, Clone, Copy)]
pub struct ExecutionPoint<'a> {
    /// Script the program was registered as
    pub script_id: &'a ScriptId,
    /// Function body being executed
    pub program: &'a Program,
    /// Index of the instruction about to run
    pub pc: u32,
    /// Call depth, 0 for the top-level script
    pub depth: usize,
}

const DEBUGGER_ID: &str = "heron-debugger";

#[derive(Debug)]
struct Script {
    id: ScriptId,
    source: Arc<SourceFile>,
    /// Source offsets of every mapped instruction, sorted and unique
    stops: Vec<u32>,
}

impl Script {
    fn location(&self, pos: u32) -> Location {
        let Position { line, column } = self.source.position(pos);
        Location {
            script_id: self.id.clone(),
            line_number: line - 1,
            column_number: column - 1,
        }
    }

    /// First stop at or after `position`
    fn resolve(&self, position: Position) -> Option<u32> {
        let offset = self.source.offset_of(position)?;
        let idx = self.stops.partition_point(|&stop| stop < offset);
        self.stops.get(idx).copied()
    }

    fn offset_or_end(&self, position: Position) -> u32 {
        self.source
            .offset_of(position)
            .unwrap_or(self.source.text().len() as u32)
    }
}

#[derive(Debug)]
enum BreakpointTarget {
    Script(ScriptId),
    Url(String),
}

#[derive(Debug)]
struct Breakpoint {
    id: BreakpointId,
    target: BreakpointTarget,
    /// Requested position, 1-based
    position: Position,
    condition: Option<String>,
    /// Scripts and source offsets this breakpoint is bound to
    resolved: Vec<(ScriptId, u32)>,
}

impl Breakpoint {
    fn applies_to(&self, script: &Script) -> bool {
        match &self.target {
            BreakpointTarget::Script(id) => *id == script.id,
            BreakpointTarget::Url(url) => url == script.source.name(),
        }
    }

    fn hits(&self, script_id: &ScriptId, pos: u32) -> bool {
        self.resolved
            .iter()
            .any(|(id, at)| id == script_id && *at == pos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Into,
    Over,
    Out,
}

#[derive(Debug, Clone, Copy)]
struct StepRequest {
    kind: StepKind,
    depth: usize,
}

impl StepRequest {
    fn reached(&self, depth: usize) -> bool {
        match self.kind {
            StepKind::Into => true,
            StepKind::Over => depth <= self.depth,
            StepKind::Out => depth < self.depth,
        }
    }
}

#[derive(Debug)]
struct PauseState {
    call_frames: Vec<CallFrame>,
    depth: usize,
}

/// Breakpoints, pause state and queued events for a set of programs
#[derive(Debug)]
pub struct DebugSession<H> {
    host: H,
    enabled: bool,
    scripts: Vec<Script>,
    next_script_id: u32,
    breakpoints: Vec<Breakpoint>,
    next_breakpoint_id: u32,
    pause_on_exceptions: PauseOnExceptionsState,
    pause_requested: bool,
    step: Option<StepRequest>,
    paused: Option<PauseState>,
    events: VecDeque<Event>,
}

impl<H: RuntimeHost> DebugSession<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            enabled: false,
            scripts: Vec::new(),
            next_script_id: 1,
            breakpoints: Vec::new(),
            next_breakpoint_id: 1,
            pause_on_exceptions: PauseOnExceptionsState::None,
            pause_requested: false,
            step: None,
            paused: None,
            events: VecDeque::new(),
        }
    }

    /// Wrap the session for sharing with a listener
    pub fn shared(self) -> SharedSession<H> {
        Arc::new(Mutex::new(self))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// Make a program and its nested functions visible to the client
    pub fn register_program(&mut self, program: &Program) -> ScriptId {
        let id = ScriptId(self.next_script_id.to_string());
        self.next_script_id += 1;

        let mut stops = Vec::new();
        collect_stops(program, &mut stops);
        stops.sort_unstable();
        stops.dedup();

        let script = Script {
            id: id.clone(),
            source: Arc::clone(&program.source),
            stops,
        };
        tracing::debug!(script_id = %id, url = script.source.name(), "script registered");

        if self.enabled {
            self.events
                .push_back(Event::ScriptParsed(script_parsed(&script)));
        }

        // Late binding of breakpoints set by URL before the script existed
        for breakpoint in &mut self.breakpoints {
            if !breakpoint.applies_to(&script) {
                continue;
            }
            if let Some(pos) = script.resolve(breakpoint.position) {
                breakpoint.resolved.push((id.clone(), pos));
                if self.enabled {
                    self.events
                        .push_back(Event::BreakpointResolved(BreakpointResolvedEvent {
                            breakpoint_id: breakpoint.id.clone(),
                            location: script.location(pos),
                        }));
                }
            }
        }

        self.scripts.push(script);
        id
    }

    /// Location of the instruction at `point`, if it is mapped
    pub fn location_of(&self, point: ExecutionPoint<'_>) -> Option<Location> {
        let script = self.script(point.script_id).ok()?;
        let pos = exact_position(point.program, point.pc)?;
        Some(script.location(pos))
    }

    /// Called by the executor before a mapped instruction runs.
    ///
    /// `frames` is only invoked when the session decides to pause. Returns
    /// whether execution is now paused.
    pub fn on_instruction(
        &mut self,
        point: ExecutionPoint<'_>,
        frames: impl FnOnce() -> Vec<CallFrame>,
    ) -> bool {
        if !self.enabled || self.paused.is_some() {
            return false;
        }
        let Some(pos) = exact_position(point.program, point.pc) else {
            return false;
        };

        let hit: Vec<usize> = self
            .breakpoints
            .iter()
            .enumerate()
            .filter(|(_, bp)| bp.hits(point.script_id, pos))
            .map(|(idx, _)| idx)
            .collect();
        let stepping = self.step.is_some_and(|step| step.reached(point.depth));
        if hit.is_empty() && !stepping && !self.pause_requested {
            return false;
        }

        let call_frames = frames();
        let mut hit_breakpoints = Vec::new();
        for idx in hit {
            let breakpoint = &self.breakpoints[idx];
            let take = match (&breakpoint.condition, call_frames.first()) {
                (None, _) => true,
                (Some(condition), Some(top)) => {
                    match self.host.evaluate(&top.call_frame_id, condition) {
                        Ok(value) => is_truthy(&value),
                        Err(_) => false,
                    }
                }
                (Some(_), None) => false,
            };
            if take {
                hit_breakpoints.push(self.breakpoints[idx].id.clone());
            }
        }
        if hit_breakpoints.is_empty() && !stepping && !self.pause_requested {
            return false;
        }

        self.pause_requested = false;
        self.step = None;
        self.pause(PausedReason::Other, None, hit_breakpoints, call_frames, point.depth);
        true
    }

    /// Called by the executor when a value is thrown. Returns whether
    /// execution is now paused.
    pub fn on_exception(
        &mut self,
        point: ExecutionPoint<'_>,
        uncaught: bool,
        exception: RemoteObject,
        frames: impl FnOnce() -> Vec<CallFrame>,
    ) -> bool {
        if !self.enabled || self.paused.is_some() {
            return false;
        }
        let pause = match self.pause_on_exceptions {
            PauseOnExceptionsState::None => false,
            PauseOnExceptionsState::Uncaught => uncaught,
            PauseOnExceptionsState::All => true,
        };
        if !pause {
            return false;
        }

        let data = serde_json::to_value(&exception).ok();
        self.step = None;
        self.pause_requested = false;
        self.pause(PausedReason::Exception, data, Vec::new(), frames(), point.depth);
        true
    }

    fn pause(
        &mut self,
        reason: PausedReason,
        data: Option<Value>,
        hit_breakpoints: Vec<BreakpointId>,
        call_frames: Vec<CallFrame>,
        depth: usize,
    ) {
        tracing::debug!(?reason, breakpoints = hit_breakpoints.len(), "execution paused");
        self.events.push_back(Event::Paused(PausedEvent {
            call_frames: call_frames.clone(),
            reason,
            data,
            hit_breakpoints,
        }));
        self.paused = Some(PauseState { call_frames, depth });
    }

    fn resume(&mut self) {
        if self.paused.take().is_some() {
            tracing::debug!("execution resumed");
            self.events.push_back(Event::Resumed(Empty {}));
        }
    }

    /// Take all queued events
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Decode a raw request body and dispatch it
    pub fn handle_message(&mut self, body: &[u8]) -> Response {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => return Response::error(None, ProtocolError::parse_error(e.to_string())),
        };
        let id = value.get("id").and_then(Value::as_u64);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request),
            Err(e) => Response::error(id, ProtocolError::invalid_request(e.to_string())),
        }
    }

    /// Dispatch one command
    pub fn handle(&mut self, request: Request) -> Response {
        tracing::debug!(id = request.id, method = %request.method, "inspector request");
        let Request { id, method, params } = request;
        match self.dispatch(&method, params) {
            Ok(result) => Response::result(id, result),
            Err(error) => {
                tracing::debug!(id, method = %method, code = error.code, "inspector error");
                Response::error(Some(id), error)
            }
        }
    }

    fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, ProtocolError> {
        if method.starts_with("Debugger.") && method != "Debugger.enable" && !self.enabled {
            return Err(ProtocolError::server_error("Debugger agent is not enabled"));
        }

        match method {
            "Debugger.enable" => to_result(self.enable()),
            "Debugger.disable" => {
                self.disable();
                to_result(Empty {})
            }
            "Debugger.setBreakpoint" => {
                let result = self.set_breakpoint(parse_params(params)?)?;
                to_result(result)
            }
            "Debugger.setBreakpointByUrl" => {
                let result = self.set_breakpoint_by_url(parse_params(params)?)?;
                to_result(result)
            }
            "Debugger.removeBreakpoint" => {
                let params: RemoveBreakpointParams = parse_params(params)?;
                self.remove_breakpoint(&params.breakpoint_id)?;
                to_result(Empty {})
            }
            "Debugger.getPossibleBreakpoints" => {
                let result = self.possible_breakpoints(parse_params(params)?)?;
                to_result(result)
            }
            "Debugger.getScriptSource" => {
                let params: GetScriptSourceParams = parse_params(params)?;
                let script = self.script(&params.script_id)?;
                to_result(GetScriptSourceResult {
                    script_source: script.source.text().to_string(),
                })
            }
            "Debugger.pause" => {
                if self.paused.is_none() {
                    self.pause_requested = true;
                }
                to_result(Empty {})
            }
            "Debugger.resume" => {
                self.require_paused()?;
                self.resume();
                to_result(Empty {})
            }
            "Debugger.stepInto" => self.step(StepKind::Into),
            "Debugger.stepOver" => self.step(StepKind::Over),
            "Debugger.stepOut" => self.step(StepKind::Out),
            "Debugger.evaluateOnCallFrame" => {
                let result = self.evaluate_on_call_frame(parse_params(params)?)?;
                to_result(result)
            }
            "Debugger.setPauseOnExceptions" => {
                let params: SetPauseOnExceptionsParams = parse_params(params)?;
                self.pause_on_exceptions = params.state;
                to_result(Empty {})
            }
            "Runtime.getProperties" => {
                let params: GetPropertiesParams = parse_params(params)?;
                let result = self
                    .host
                    .get_properties(&params.object_id, params.own_properties)
                    .ok_or_else(|| {
                        ProtocolError::server_error("Could not find object with given id")
                    })?;
                let result = if params.accessor_properties_only {
                    result
                        .into_iter()
                        .filter(|p| p.get.is_some() || p.set.is_some())
                        .collect()
                } else {
                    result
                };
                to_result(GetPropertiesResult {
                    result,
                    exception_details: None,
                })
            }
            "Inspector.drainEvents" => to_result(DrainEventsResult {
                events: self.drain_events(),
            }),
            _ => Err(ProtocolError::method_not_found(method)),
        }
    }

    fn enable(&mut self) -> EnableResult {
        if !self.enabled {
            self.enabled = true;
            let parsed: Vec<Event> = self
                .scripts
                .iter()
                .map(|script| Event::ScriptParsed(script_parsed(script)))
                .collect();
            self.events.extend(parsed);
        }
        EnableResult {
            debugger_id: DEBUGGER_ID.to_string(),
        }
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.breakpoints.clear();
        self.pause_requested = false;
        self.step = None;
        self.pause_on_exceptions = PauseOnExceptionsState::None;
        self.paused = None;
        self.events.clear();
    }

    fn script(&self, id: &ScriptId) -> Result<&Script, ProtocolError> {
        self.scripts
            .iter()
            .find(|script| script.id == *id)
            .ok_or_else(|| ProtocolError::server_error(format!("No script for id: {id}")))
    }

    fn require_paused(&self) -> Result<&PauseState, ProtocolError> {
        self.paused
            .as_ref()
            .ok_or_else(|| ProtocolError::server_error("Can only perform operation while paused."))
    }

    fn next_breakpoint_id(&mut self) -> u32 {
        let id = self.next_breakpoint_id;
        self.next_breakpoint_id += 1;
        id
    }

    fn set_breakpoint(
        &mut self,
        params: SetBreakpointParams,
    ) -> Result<SetBreakpointResult, ProtocolError> {
        let location = params.location;
        let position = one_based(location.line_number, location.column_number)?;
        let script = self.script(&location.script_id)?;
        let pos = script
            .resolve(position)
            .ok_or_else(|| ProtocolError::server_error("Could not resolve breakpoint"))?;
        let actual_location = script.location(pos);
        if self
            .breakpoints
            .iter()
            .any(|bp| bp.hits(&location.script_id, pos))
        {
            return Err(ProtocolError::server_error(
                "Breakpoint at specified location already exists.",
            ));
        }

        let id = BreakpointId(format!(
            "{}:{}:{}:{}",
            self.next_breakpoint_id(),
            location.line_number,
            location.column_number,
            location.script_id
        ));
        self.breakpoints.push(Breakpoint {
            id: id.clone(),
            target: BreakpointTarget::Script(location.script_id.clone()),
            position,
            condition: params.condition.filter(|c| !c.is_empty()),
            resolved: vec![(location.script_id, pos)],
        });

        Ok(SetBreakpointResult {
            breakpoint_id: id,
            actual_location,
        })
    }

    fn set_breakpoint_by_url(
        &mut self,
        params: SetBreakpointByUrlParams,
    ) -> Result<SetBreakpointByUrlResult, ProtocolError> {
        let url = match (params.url, params.url_regex) {
            (Some(url), _) => url,
            (None, Some(_)) => {
                return Err(ProtocolError::invalid_params("urlRegex is not supported"));
            }
            (None, None) => {
                return Err(ProtocolError::invalid_params(
                    "Either url or urlRegex must be specified.",
                ));
            }
        };
        let line = params.line_number;
        let column = params.column_number.unwrap_or(0);
        let position = one_based(line, column)?;

        let id = BreakpointId(format!("1:{line}:{column}:{url}"));
        if self.breakpoints.iter().any(|bp| bp.id == id) {
            return Err(ProtocolError::server_error(
                "Breakpoint at specified location already exists.",
            ));
        }

        let mut breakpoint = Breakpoint {
            id: id.clone(),
            target: BreakpointTarget::Url(url),
            position,
            condition: params.condition.filter(|c| !c.is_empty()),
            resolved: Vec::new(),
        };
        let mut locations = Vec::new();
        for script in &self.scripts {
            if !breakpoint.applies_to(script) {
                continue;
            }
            if let Some(pos) = script.resolve(position) {
                breakpoint.resolved.push((script.id.clone(), pos));
                locations.push(script.location(pos));
            }
        }
        self.breakpoints.push(breakpoint);

        Ok(SetBreakpointByUrlResult {
            breakpoint_id: id,
            locations,
        })
    }

    fn remove_breakpoint(&mut self, id: &BreakpointId) -> Result<(), ProtocolError> {
        let idx = self
            .breakpoints
            .iter()
            .position(|bp| bp.id == *id)
            .ok_or_else(|| {
                ProtocolError::server_error("Breakpoint with given id does not exist")
            })?;
        self.breakpoints.remove(idx);
        Ok(())
    }

    fn possible_breakpoints(
        &self,
        params: GetPossibleBreakpointsParams,
    ) -> Result<GetPossibleBreakpointsResult, ProtocolError> {
        let script = self.script(&params.start.script_id)?;
        if let Some(end) = &params.end {
            if end.script_id != script.id {
                return Err(ProtocolError::invalid_params(
                    "Locations should contain the same scriptId",
                ));
            }
        }

        let start = script.offset_or_end(one_based(
            params.start.line_number,
            params.start.column_number,
        )?);
        let end = match &params.end {
            Some(end) => script.offset_or_end(one_based(end.line_number, end.column_number)?),
            None => u32::MAX,
        };
        let locations = script
            .stops
            .iter()
            .filter(|&&pos| pos >= start && pos < end)
            .map(|&pos| {
                let location = script.location(pos);
                BreakLocation {
                    script_id: location.script_id,
                    line_number: location.line_number,
                    column_number: location.column_number,
                    kind: None,
                }
            })
            .collect();
        Ok(GetPossibleBreakpointsResult { locations })
    }

    fn step(&mut self, kind: StepKind) -> Result<Value, ProtocolError> {
        let depth = self.require_paused()?.depth;
        self.step = Some(StepRequest { kind, depth });
        self.resume();
        to_result(Empty {})
    }

    fn evaluate_on_call_frame(
        &mut self,
        params: EvaluateOnCallFrameParams,
    ) -> Result<EvaluateOnCallFrameResult, ProtocolError> {
        let paused = self.require_paused()?;
        if !paused
            .call_frames
            .iter()
            .any(|frame| frame.call_frame_id == params.call_frame_id)
        {
            return Err(ProtocolError::server_error(
                "Could not find call frame with given id",
            ));
        }

        let result = match self
            .host
            .evaluate(&params.call_frame_id, &params.expression)
        {
            Ok(result) => EvaluateOnCallFrameResult {
                result,
                exception_details: None,
            },
            Err(details) => EvaluateOnCallFrameResult {
                result: details
                    .exception
                    .clone()
                    .unwrap_or_else(|| RemoteObject::string(details.text.clone())),
                exception_details: Some(details),
            },
        };
        Ok(result)
    }
}

/// Convert a 0-based protocol line and column
fn one_based(line: u32, column: u32) -> Result<Position, ProtocolError> {
    match (line.checked_add(1), column.checked_add(1)) {
        (Some(line), Some(column)) => Ok(Position { line, column }),
        _ => Err(ProtocolError::invalid_params("Location is out of range")),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| ProtocolError::invalid_params(e.to_string()))
}

fn to_result<T: Serialize>(result: T) -> Result<Value, ProtocolError> {
    serde_json::to_value(result).map_err(|e| ProtocolError::server_error(e.to_string()))
}

fn collect_stops(program: &Program, stops: &mut Vec<u32>) {
    stops.extend(program.source_map.iter().map(|entry| entry.pos));
    for nested in program.nested_functions() {
        collect_stops(nested, stops);
    }
}

/// Source offset recorded for exactly this instruction
fn exact_position(program: &Program, pc: u32) -> Option<u32> {
    program
        .source_map
        .binary_search_by_key(&pc, |entry| entry.pc)
        .ok()
        .map(|idx| program.source_map[idx].pos)
}

fn script_parsed(script: &Script) -> ScriptParsedEvent {
    let source = &script.source;
    let text_len = source.text().len() as u32;
    let last_line_start = source.line_offsets().last().copied().unwrap_or(0);
    ScriptParsedEvent {
        script_id: script.id.clone(),
        url: source.name().to_string(),
        start_line: 0,
        start_column: 0,
        end_line: source.line_offsets().len().saturating_sub(1) as u32,
        end_column: text_len.saturating_sub(last_line_start),
        execution_context_id: 1,
        hash: CacheStore::key_for(source),
        length: text_len,
    }
}

fn is_truthy(value: &RemoteObject) -> bool {
    match value.kind {
        RemoteObjectType::Undefined => false,
        RemoteObjectType::Object => value.value != Some(Value::Null) || value.object_id.is_some(),
        RemoteObjectType::Boolean => value.value == Some(Value::Bool(true)),
        RemoteObjectType::Number => match &value.value {
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            // NaN, -0 and the infinities travel as unserializable values
            _ => matches!(
                value.unserializable_value,
                Some(UnserializableValue::Infinity | UnserializableValue::NegativeInfinity)
            ),
        },
        RemoteObjectType::String => matches!(&value.value, Some(Value::String(s)) if !s.is_empty()),
        RemoteObjectType::Function | RemoteObjectType::Symbol => true,
    }
}
