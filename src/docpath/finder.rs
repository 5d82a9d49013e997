//! Backtracking path finder
//!
//! Consumes document events one at a time and places each one in the
//! automaton. A start-element event may be reachable through several
//! routes (leave some open groups, then enter a chain of edges down to a
//! matching element or wildcard); routes are enumerated without touching
//! the walk, tried in precedence order, and the alternatives are kept as a
//! decision point. When a later event is rejected the walk rewinds to the
//! newest decision point, commits its next route and replays the events
//! recorded since. Configurations from which the remaining events were
//! already shown to fail are not explored twice within one recovery, and
//! the event log only reaches back to the oldest pending decision point.
//!
//! Route precedence: innermost open node first, then edges in declared
//! order, then deeper descents in declared order.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::automaton::{Automaton, AutomatonNode, NodeId, NodeKind};
use crate::error::{Error, Result, ValidationFailure};
use crate::limits::Limits;
use crate::namespaces::QName;

use super::document::{DocId, DocumentNode, NodeState};
use super::events::Attribute;
use super::path::{Direction, DocumentPath, Frame, PathStep, Undo};

/// Leave `exits` open nodes, then enter `enters` edge positions in turn
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    exits: usize,
    enters: Vec<usize>,
}

#[derive(Debug, Clone)]
struct DecisionPoint {
    /// Path length before the route was applied
    mark: usize,
    /// Index of the start-element event in the event log
    event: usize,
    /// Untried routes in precedence order
    routes: VecDeque<Route>,
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start { name: QName, nil: bool },
    End { name: QName },
    Text(String),
}

/// An accepted event and the route it took, if it opened an element
#[derive(Debug, Clone)]
struct Logged {
    event: Event,
    route: Option<Route>,
}

enum Replay {
    Accepted(Option<Route>),
    Rejected,
}

/// Everything about an open node that decides which events it accepts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FrameKey {
    node: NodeId,
    iteration: u64,
    position: Option<usize>,
    counts: Vec<(usize, u64)>,
    name: Option<QName>,
    nil: bool,
    skip_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    rooted: bool,
    frames: Vec<FrameKey>,
}

/// Bookkeeping of one rejected event while its alternatives are tried, so
/// the walk can be put back exactly as it was
#[derive(Debug, Default)]
struct Recovery {
    /// Decision stack depth below which nothing was popped
    boundary: usize,
    /// Decision points popped from below the boundary, newest first
    saved: Vec<DecisionPoint>,
    /// Event index from which logged routes may have been rewritten
    routes_from: usize,
    /// Routes as they were before rewriting
    routes: Vec<(usize, Option<Route>)>,
    /// (event index, configuration) pairs that cannot accept the remaining
    /// events
    dead: HashSet<(usize, Signature)>,
    backtracks: usize,
}

#[derive(Debug)]
enum Terminal {
    Rejected(ValidationFailure),
    Aborted(String),
}

/// Counters of one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Events accepted
    pub events: usize,
    /// Decision points created
    pub decisions: usize,
    /// Routes retried after a rejected event
    pub backtracks: usize,
}

/// Mutable state of a walk; every change to it is journaled in `steps`
#[derive(Debug, Clone, Default)]
struct WalkState {
    nodes: Vec<DocumentNode>,
    steps: Vec<PathStep>,
    frames: Vec<Frame>,
    decisions: Vec<DecisionPoint>,
    root: Option<DocId>,
}

/// Walks one document against an automaton
#[derive(Debug)]
pub struct PathFinder {
    automaton: Arc<Automaton>,
    limits: Limits,
    state: WalkState,
    /// Events from index `base` on; earlier ones are never replayed
    log: Vec<Logged>,
    base: usize,
    recovery: Option<Recovery>,
    stats: WalkStats,
    terminal: Option<Terminal>,
}

impl PathFinder {
    /// Create a path finder with default limits
    pub fn new(automaton: Arc<Automaton>) -> Self {
        Self::with_limits(automaton, Limits::default())
    }

    /// Create a path finder with explicit limits
    pub fn with_limits(automaton: Arc<Automaton>, limits: Limits) -> Self {
        Self {
            automaton,
            limits,
            state: WalkState::default(),
            log: Vec::new(),
            base: 0,
            recovery: None,
            stats: WalkStats::default(),
            terminal: None,
        }
    }

    /// Accept a start-element event
    pub fn start_element(&mut self, name: &QName, attributes: &[Attribute]) -> Result<()> {
        let nil = attributes
            .iter()
            .any(|attr| attr.name.is_xsi_nil() && matches!(attr.value.trim(), "true" | "1"));
        self.feed(Event::Start {
            name: name.clone(),
            nil,
        })
    }

    /// Accept an end-element event
    pub fn end_element(&mut self, name: &QName) -> Result<()> {
        self.feed(Event::End { name: name.clone() })
    }

    /// Accept text content; whitespace-only text is ignored
    pub fn characters(&mut self, text: &str) -> Result<()> {
        self.check_open()?;
        if text.trim().is_empty() {
            return Ok(());
        }
        self.feed(Event::Text(text.to_string()))
    }

    /// Check that the root element was matched and closed
    pub fn end_document(&mut self) -> Result<()> {
        self.check_open()?;
        let failure = if self.state.root.is_none() {
            Some(ValidationFailure::new("document has no root element"))
        } else if !self.state.frames.is_empty() {
            Some(
                ValidationFailure::new("root element was not closed")
                    .with_path(self.state.path_string()),
            )
        } else {
            None
        };
        if let Some(failure) = failure {
            return Err(self.reject(failure));
        }

        debug!(
            events = self.stats.events,
            decisions = self.stats.decisions,
            backtracks = self.stats.backtracks,
            nodes = self.state.nodes.len(),
            "Walk complete"
        );
        Ok(())
    }

    /// The automaton being walked
    pub fn automaton(&self) -> &Arc<Automaton> {
        &self.automaton
    }

    /// Walk counters
    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    /// The failure that ended the walk, if any
    pub fn failure(&self) -> Option<&ValidationFailure> {
        match &self.terminal {
            Some(Terminal::Rejected(failure)) => Some(failure),
            _ => None,
        }
    }

    /// Whether the walk refuses further events
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Root document node
    pub fn root(&self) -> Option<DocId> {
        self.state.root
    }

    /// Document node by handle
    pub fn node(&self, id: DocId) -> Option<&DocumentNode> {
        self.state.nodes.get(id.0)
    }

    /// Committed steps
    pub fn steps(&self) -> &[PathStep] {
        &self.state.steps
    }

    /// Number of open elements, including ones skipped under a wildcard
    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    /// Walk state of a document node
    pub fn state(&self, id: DocId) -> NodeState {
        let Some(doc) = self.state.nodes.get(id.0) else {
            return NodeState::Unvisited;
        };
        match self.state.frames.iter().position(|frame| frame.doc == id) {
            Some(index) if index + 1 == self.state.frames.len() && self.failure().is_some() => {
                NodeState::Failed
            }
            Some(index) => NodeState::InProgress {
                iteration: doc.iteration,
                position: self.state.frames[index].position,
            },
            None => NodeState::Satisfied,
        }
    }

    /// Walk state of the child at `position` in the current iteration of
    /// `parent`
    pub fn child_state(&self, parent: DocId, position: usize) -> NodeState {
        match self.node(parent).and_then(|doc| doc.child(doc.iteration, position)) {
            Some(child) => self.state(child),
            None => NodeState::Unvisited,
        }
    }

    /// Snapshot of the path built so far
    pub fn path(&self) -> DocumentPath {
        DocumentPath {
            automaton: Arc::clone(&self.automaton),
            nodes: self.state.nodes.clone(),
            steps: self.state.steps.clone(),
            root: self.state.root,
        }
    }

    /// Finish the walk and take its path
    pub fn into_path(self) -> DocumentPath {
        DocumentPath {
            automaton: self.automaton,
            nodes: self.state.nodes,
            steps: self.state.steps,
            root: self.state.root,
        }
    }

    fn check_open(&self) -> Result<()> {
        match &self.terminal {
            Some(Terminal::Rejected(failure)) => Err(Error::Validation(failure.clone())),
            Some(Terminal::Aborted(message)) => {
                Err(Error::internal(format!("walk aborted: {}", message)))
            }
            None => Ok(()),
        }
    }

    fn feed(&mut self, event: Event) -> Result<()> {
        self.check_open()?;
        let index = self.next_index();
        match self.apply_event(&event, index) {
            Ok(route) => {
                self.accept(event, route);
                Ok(())
            }
            Err(Error::Validation(failure)) => self.recover(event, failure),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn next_index(&self) -> usize {
        self.base + self.log.len()
    }

    fn logged(&self, index: usize) -> Result<&Logged> {
        index
            .checked_sub(self.base)
            .and_then(|offset| self.log.get(offset))
            .ok_or_else(|| Error::internal(format!("event {} is no longer logged", index)))
    }

    fn accept(&mut self, event: Event, route: Option<Route>) {
        self.log.push(Logged { event, route });
        self.stats.events += 1;
        if self.state.decisions.is_empty() {
            self.base += self.log.len();
            self.log.clear();
        }
    }

    fn reject(&mut self, failure: ValidationFailure) -> Error {
        warn!(
            message = %failure.message,
            name = ?failure.name.as_ref().map(ToString::to_string),
            path = ?failure.path,
            "Document rejected"
        );
        self.terminal = Some(Terminal::Rejected(failure.clone()));
        Error::Validation(failure)
    }

    fn abort(&mut self, err: Error) -> Error {
        warn!(error = %err, "Walk aborted");
        self.terminal = Some(Terminal::Aborted(err.to_string()));
        err
    }

    /// Retry a rejected event through the pending decision points. The
    /// reported failure is the first rejection; the walk is put back to the
    /// state after the last accepted event when no alternative works.
    fn recover(&mut self, event: Event, failure: ValidationFailure) -> Result<()> {
        if self.state.decisions.is_empty() {
            return Err(self.reject(failure));
        }

        self.recovery = Some(Recovery {
            boundary: self.state.decisions.len(),
            routes_from: self.next_index(),
            ..Recovery::default()
        });
        let outcome = self.backtrack(&event);
        let recovery = self.recovery.take().unwrap_or_default();
        match outcome {
            Ok(Replay::Accepted(route)) => {
                self.discard_exhausted(recovery.boundary);
                self.accept(event, route);
                Ok(())
            }
            Ok(Replay::Rejected) => match self.restore(recovery) {
                Ok(()) => Err(self.reject(failure)),
                Err(err) => Err(self.abort(err)),
            },
            Err(err) => {
                if let Err(restore) = self.restore(recovery) {
                    warn!(error = %restore, "Walk could not be restored");
                }
                Err(self.abort(err))
            }
        }
    }

    fn backtrack(&mut self, event: &Event) -> Result<Replay> {
        let automaton = Arc::clone(&self.automaton);
        while let Some(mut decision) = self.pop_decision() {
            self.state.undo_to(decision.mark)?;
            let index = decision.event;
            let Some(route) = decision.routes.pop_front() else {
                // Every route from here was tried against the same events
                let signature = self.state.signature()?;
                if let Some(recovery) = self.recovery.as_mut() {
                    recovery.dead.insert((index, signature));
                }
                continue;
            };
            self.stats.backtracks += 1;
            if let Some(recovery) = self.recovery.as_mut() {
                recovery.backtracks += 1;
                self.limits.check_backtracks(recovery.backtracks)?;
            }
            self.state.decisions.push(decision);

            let Event::Start { name, nil } = self.logged(index)?.event.clone() else {
                return Err(Error::internal(format!(
                    "decision point refers to event {} which is not a start element",
                    index
                )));
            };
            debug!(
                event = index,
                name = %name,
                exits = route.exits,
                enters = ?route.enters,
                "Backtracking"
            );
            self.state.apply_route(&automaton, &route, &name, nil, index)?;
            self.set_route(index, Some(route))?;

            if let Replay::Accepted(route) = self.replay(index + 1, event)? {
                return Ok(Replay::Accepted(route));
            }
        }
        Ok(Replay::Rejected)
    }

    /// Re-apply logged events from `from`, then `event`
    fn replay(&mut self, from: usize, event: &Event) -> Result<Replay> {
        let end = self.next_index();
        for index in from..end {
            let logged = self.logged(index)?.event.clone();
            if matches!(logged, Event::Start { .. }) && self.is_dead(index)? {
                trace!(event = index, "Configuration already failed");
                return Ok(Replay::Rejected);
            }
            match self.apply_event(&logged, index) {
                Ok(route) => self.set_route(index, route)?,
                Err(Error::Validation(_)) => return Ok(Replay::Rejected),
                Err(err) => return Err(err),
            }
        }
        match self.apply_event(event, end) {
            Ok(route) => Ok(Replay::Accepted(route)),
            Err(Error::Validation(_)) => Ok(Replay::Rejected),
            Err(err) => Err(err),
        }
    }

    fn is_dead(&self, index: usize) -> Result<bool> {
        match &self.recovery {
            Some(recovery) if !recovery.dead.is_empty() => {
                let signature = self.state.signature()?;
                Ok(recovery.dead.contains(&(index, signature)))
            }
            _ => Ok(false),
        }
    }

    /// Pop the newest decision point, keeping a copy of it while recovering
    /// if it predates the rejected event
    fn pop_decision(&mut self) -> Option<DecisionPoint> {
        let decision = self.state.decisions.pop()?;
        let depth = self.state.decisions.len();
        if let Some(recovery) = self.recovery.as_mut() {
            if depth < recovery.boundary {
                recovery.saved.push(decision.clone());
                recovery.boundary = depth;
            }
        }
        Some(decision)
    }

    fn set_route(&mut self, index: usize, route: Option<Route>) -> Result<()> {
        let offset = index
            .checked_sub(self.base)
            .filter(|&offset| offset < self.log.len())
            .ok_or_else(|| Error::internal(format!("event {} is no longer logged", index)))?;
        if let Some(recovery) = self.recovery.as_mut() {
            if index < recovery.routes_from {
                for earlier in index..recovery.routes_from {
                    let original = self.log[earlier - self.base].route.clone();
                    recovery.routes.push((earlier, original));
                }
                recovery.routes_from = index;
            }
        }
        self.log[offset].route = route;
        Ok(())
    }

    /// Drop decision points left without routes by a successful recovery
    fn discard_exhausted(&mut self, boundary: usize) {
        let boundary = boundary.min(self.state.decisions.len());
        let mut touched = self.state.decisions.split_off(boundary);
        touched.retain(|decision| !decision.routes.is_empty());
        self.state.decisions.append(&mut touched);
    }

    /// Put the walk back to the state after the last accepted event: rewind
    /// to the oldest decision point that was popped and re-apply the logged
    /// events along their original routes
    fn restore(&mut self, recovery: Recovery) -> Result<()> {
        let Recovery {
            boundary,
            saved,
            routes,
            ..
        } = recovery;
        for (index, route) in routes {
            let offset = index
                .checked_sub(self.base)
                .filter(|&offset| offset < self.log.len())
                .ok_or_else(|| Error::internal(format!("event {} is no longer logged", index)))?;
            self.log[offset].route = route;
        }
        let Some(oldest) = saved.last() else {
            return Ok(());
        };
        let (mark, from) = (oldest.mark, oldest.event);

        let automaton = Arc::clone(&self.automaton);
        self.state.undo_to(mark)?;
        self.state.decisions.truncate(boundary);
        for index in from..self.next_index() {
            let Logged { event, route } = self.logged(index)?.clone();
            match (event, route) {
                (Event::Start { name, nil }, Some(route)) => {
                    self.state.apply_route(&automaton, &route, &name, nil, index)?
                }
                (Event::Start { name, .. }, None) => self.state.skip_start(&name)?,
                (Event::End { name }, _) => self.close(&name)?,
                (Event::Text(text), _) => self.text(&text)?,
            }
        }
        self.state.decisions.extend(saved.into_iter().rev());
        Ok(())
    }

    fn apply_event(&mut self, event: &Event, index: usize) -> Result<Option<Route>> {
        match event {
            Event::Start { name, nil } => self.open(name, *nil, index),
            Event::End { name } => self.close(name).map(|()| None),
            Event::Text(text) => self.text(text).map(|()| None),
        }
    }

    fn open(&mut self, name: &QName, nil: bool, index: usize) -> Result<Option<Route>> {
        let automaton = Arc::clone(&self.automaton);
        self.limits.check_document_depth(self.state.depth() + 1)?;

        if let Some(frame) = self.state.frames.last() {
            if matches!(self.state.frame_node(&automaton, frame)?.kind(), NodeKind::Wildcard(_)) {
                return self.state.skip_start(name).map(|()| None);
            }
        }

        let found = self.state.routes(&automaton, name)?;
        let total = found.len();
        let mut routes = VecDeque::with_capacity(total);
        for route in found {
            if !nil || self.state.nillable_target(&automaton, &route)? {
                routes.push_back(route);
            }
        }

        let Some(route) = routes.pop_front() else {
            let reason = if total > 0 {
                Some("element is not nillable")
            } else if self.state.innermost_nil() {
                Some("element is nilled and must be empty")
            } else {
                None
            };
            return Err(self.state.mismatch(&automaton, name, reason)?.into());
        };

        if !routes.is_empty() {
            self.stats.decisions += 1;
            debug!(
                event = index,
                name = %name,
                alternatives = routes.len(),
                "Decision point"
            );
            self.state.decisions.push(DecisionPoint {
                mark: self.state.steps.len(),
                event: index,
                routes,
            });
        }
        self.state.apply_route(&automaton, &route, name, nil, index)?;
        Ok(Some(route))
    }

    fn close(&mut self, name: &QName) -> Result<()> {
        let automaton = Arc::clone(&self.automaton);
        let state = &self.state;
        let Some(top) = state.frames.last() else {
            return Err(ValidationFailure::new(format!("unexpected end of element {}", name))
                .with_name(name.clone())
                .into());
        };
        if top.skip_depth > 0 {
            return self.state.skip_end();
        }

        let mut leaf = None;
        for (index, frame) in state.frames.iter().enumerate().rev() {
            if state.is_leaf(&automaton, frame)? {
                leaf = Some(index);
                break;
            }
        }
        let leaf = leaf.ok_or_else(|| Error::internal("no open element to close"))?;

        let doc = state.doc(state.frames[leaf].doc)?;
        if doc.name(doc.iteration) != Some(name) {
            let open = doc
                .name(doc.iteration)
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(ValidationFailure::new(format!(
                "end of element {} does not match open element {}",
                name, open
            ))
            .with_name(name.clone())
            .with_path(state.path_string())
            .into());
        }

        for frame in state.frames[leaf..].iter().rev() {
            if !state.complete(&automaton, frame)? {
                return Err(state.incomplete(&automaton, frame)?.with_name(name.clone()).into());
            }
        }

        let opened = state.frames[leaf].event;
        for _ in leaf..self.state.frames.len() {
            self.state.exit()?;
        }

        // Only a substitution group around the root can remain without an
        // open element
        let mut below = false;
        for frame in &self.state.frames {
            below |= self.state.is_leaf(&automaton, frame)?;
        }
        if !below {
            while !self.state.frames.is_empty() {
                self.state.exit()?;
            }
        }

        // Decisions taken inside a closed element cannot change anything
        // outside it
        let before = self.state.decisions.len();
        while self.state.decisions.last().is_some_and(|d| d.event > opened) {
            self.pop_decision();
        }
        if self.state.decisions.len() < before {
            trace!(
                dropped = before - self.state.decisions.len(),
                name = %name,
                "Dropped decision points of closed element"
            );
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let automaton = Arc::clone(&self.automaton);
        let state = &self.state;

        let mut leaf = None;
        for frame in state.frames.iter().rev() {
            if state.is_leaf(&automaton, frame)? {
                leaf = Some(frame);
                break;
            }
        }
        let Some(frame) = leaf else {
            return Err(ValidationFailure::new("text outside the root element").into());
        };

        let (doc, nil) = (frame.doc, frame.nil);
        match state.frame_node(&automaton, frame)?.kind() {
            NodeKind::Element(_) if nil => Err(ValidationFailure::new(
                "element is nilled and must be empty",
            )
            .with_path(state.path_string())
            .into()),
            NodeKind::Element(info) if !info.type_info.allows_text() => Err(ValidationFailure::new(
                format!("element {} does not allow text content", info.name),
            )
            .with_name(info.name.clone())
            .with_path(state.path_string())
            .into()),
            _ => self.state.content(doc, text),
        }
    }
}

/// Collect every descent from `id` into a fresh occurrence that ends at a
/// node matching `name`
fn descend(
    automaton: &Automaton,
    id: NodeId,
    name: &QName,
    prefix: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) -> Result<()> {
    let node = automaton.node(id)?;
    match node.kind() {
        NodeKind::Element(_) | NodeKind::Wildcard(_) => {
            if node.matches(name) {
                found.push(prefix.clone());
            }
        }
        NodeKind::Sequence => {
            for (position, &edge) in node.next_states().iter().enumerate() {
                let target = automaton.node(edge)?;
                if !target.occurs().is_prohibited() {
                    prefix.push(position);
                    descend(automaton, edge, name, prefix, found)?;
                    prefix.pop();
                }
                if !target.is_emptiable() {
                    break;
                }
            }
        }
        NodeKind::Choice | NodeKind::All | NodeKind::SubstitutionGroup => {
            for (position, &edge) in node.next_states().iter().enumerate() {
                if automaton.node(edge)?.occurs().is_prohibited() {
                    continue;
                }
                prefix.push(position);
                descend(automaton, edge, name, prefix, found)?;
                prefix.pop();
            }
        }
    }
    Ok(())
}

impl WalkState {
    fn doc(&self, id: DocId) -> Result<&DocumentNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::internal(format!("walk has no document node {}", id)))
    }

    fn doc_mut(&mut self, id: DocId) -> Result<&mut DocumentNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::internal(format!("walk has no document node {}", id)))
    }

    fn frame_node<'a>(&self, automaton: &'a Automaton, frame: &Frame) -> Result<&'a AutomatonNode> {
        automaton.node(self.doc(frame.doc)?.automaton_node)
    }

    fn is_leaf(&self, automaton: &Automaton, frame: &Frame) -> Result<bool> {
        Ok(matches!(
            self.frame_node(automaton, frame)?.kind(),
            NodeKind::Element(_) | NodeKind::Wildcard(_)
        ))
    }

    fn depth(&self) -> usize {
        self.frames
            .iter()
            .map(|frame| {
                let open = self
                    .nodes
                    .get(frame.doc.0)
                    .is_some_and(|doc| doc.names.contains_key(&doc.iteration));
                frame.skip_depth + usize::from(open)
            })
            .sum()
    }

    /// Key of the current configuration: two walks with equal signatures
    /// accept exactly the same continuations
    fn signature(&self) -> Result<Signature> {
        let mut frames = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let doc = self.doc(frame.doc)?;
            let mut counts = Vec::new();
            for (&position, &child) in doc.current_children().into_iter().flatten() {
                counts.push((position, self.doc(child)?.iteration));
            }
            frames.push(FrameKey {
                node: doc.automaton_node,
                iteration: doc.iteration,
                position: frame.position,
                counts,
                name: doc.name(doc.iteration).cloned(),
                nil: frame.nil,
                skip_depth: frame.skip_depth,
            });
        }
        Ok(Signature {
            rooted: self.root.is_some(),
            frames,
        })
    }

    fn innermost_nil(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.nil)
    }

    /// Occurrences of edge `position` in the current iteration of `doc`
    fn count(&self, doc: &DocumentNode, position: usize) -> u64 {
        doc.child(doc.iteration, position)
            .and_then(|child| self.nodes.get(child.0))
            .map_or(0, |child| child.iteration)
    }

    fn edge_satisfied(&self, automaton: &Automaton, doc: &DocumentNode, position: usize) -> Result<bool> {
        let edge = automaton.node(automaton.edge(doc.automaton_node, position)?)?;
        Ok(edge.is_satisfied_by(self.count(doc, position)))
    }

    /// Whether the current iteration of the frame's node may be left
    fn complete(&self, automaton: &Automaton, frame: &Frame) -> Result<bool> {
        let doc = self.doc(frame.doc)?;
        let node = automaton.node(doc.automaton_node)?;
        match node.kind() {
            NodeKind::Wildcard(_) => Ok(true),
            NodeKind::Element(_) if frame.nil => Ok(true),
            NodeKind::Element(_) | NodeKind::Sequence | NodeKind::All => {
                for position in 0..node.next_states().len() {
                    if !self.edge_satisfied(automaton, doc, position)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            NodeKind::Choice | NodeKind::SubstitutionGroup => {
                match doc.current_children().and_then(|c| c.keys().next()) {
                    Some(&chosen) => self.edge_satisfied(automaton, doc, chosen),
                    None => Ok(node.content_emptiable()),
                }
            }
        }
    }

    /// Whether edge `position` of the frame's node can be entered next
    fn can_enter(&self, automaton: &Automaton, frame: &Frame, position: usize) -> Result<bool> {
        let doc = self.doc(frame.doc)?;
        let node = automaton.node(doc.automaton_node)?;
        let edge = automaton.node(automaton.edge(doc.automaton_node, position)?)?;
        if edge.occurs().is_prohibited() {
            return Ok(false);
        }
        let count = self.count(doc, position);
        let entered = doc.current_children();

        let allowed = match node.kind() {
            NodeKind::Element(_) if frame.nil => false,
            NodeKind::Element(_) | NodeKind::Sequence => match frame.position {
                Some(current) if position < current => false,
                Some(current) if position == current => !edge.occurs().is_over(count),
                current => {
                    let from = match current {
                        Some(current) => {
                            if !self.edge_satisfied(automaton, doc, current)? {
                                return Ok(false);
                            }
                            current + 1
                        }
                        None => 0,
                    };
                    for skipped in from..position {
                        let skipped = automaton.node(automaton.edge(doc.automaton_node, skipped)?)?;
                        if !skipped.is_emptiable() {
                            return Ok(false);
                        }
                    }
                    true
                }
            },
            NodeKind::Choice | NodeKind::SubstitutionGroup => {
                match entered.and_then(|c| c.keys().next()) {
                    None => true,
                    Some(&chosen) => chosen == position && !edge.occurs().is_over(count),
                }
            }
            // Members are consumed once per iteration; only the member just
            // entered may repeat
            NodeKind::All => {
                if entered.is_some_and(|c| c.contains_key(&position)) {
                    frame.position == Some(position) && !edge.occurs().is_over(count)
                } else {
                    true
                }
            }
            NodeKind::Wildcard(_) => false,
        };
        Ok(allowed)
    }

    fn routes(&self, automaton: &Automaton, name: &QName) -> Result<Vec<Route>> {
        let mut routes = Vec::new();
        if self.frames.is_empty() {
            if self.root.is_none() {
                let mut found = Vec::new();
                descend(automaton, automaton.start(), name, &mut Vec::new(), &mut found)?;
                routes.extend(found.into_iter().map(|enters| Route { exits: 0, enters }));
            }
            return Ok(routes);
        }

        for (exits, frame) in self.frames.iter().rev().enumerate() {
            let doc = self.doc(frame.doc)?;
            let node = automaton.node(doc.automaton_node)?;
            for (position, &edge) in node.next_states().iter().enumerate() {
                if !self.can_enter(automaton, frame, position)? {
                    continue;
                }
                let mut found = Vec::new();
                descend(automaton, edge, name, &mut vec![position], &mut found)?;
                routes.extend(found.into_iter().map(|enters| Route { exits, enters }));
            }
            if matches!(node.kind(), NodeKind::Element(_) | NodeKind::Wildcard(_))
                || !self.complete(automaton, frame)?
            {
                break;
            }
        }
        Ok(routes)
    }

    fn route_target(&self, automaton: &Automaton, route: &Route) -> Result<NodeId> {
        let mut id = if self.frames.is_empty() {
            automaton.start()
        } else {
            let index = self
                .frames
                .len()
                .checked_sub(route.exits + 1)
                .ok_or_else(|| Error::internal("route leaves more nodes than are open"))?;
            self.doc(self.frames[index].doc)?.automaton_node
        };
        for &position in &route.enters {
            id = automaton.edge(id, position)?;
        }
        Ok(id)
    }

    fn nillable_target(&self, automaton: &Automaton, route: &Route) -> Result<bool> {
        let target = automaton.node(self.route_target(automaton, route)?)?;
        Ok(target.element().map_or(true, |info| info.nillable))
    }

    /// Names that could start at the current position
    fn expected_names(&self, automaton: &Automaton) -> Result<Vec<QName>> {
        let mut names = Vec::new();
        if self.frames.is_empty() {
            if self.root.is_none() {
                names = automaton.first_names(automaton.start());
            }
            return Ok(names);
        }

        for frame in self.frames.iter().rev() {
            let node = self.frame_node(automaton, frame)?;
            for (position, &edge) in node.next_states().iter().enumerate() {
                if !self.can_enter(automaton, frame, position)? {
                    continue;
                }
                for name in automaton.first_names(edge) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            if matches!(node.kind(), NodeKind::Element(_) | NodeKind::Wildcard(_))
                || !self.complete(automaton, frame)?
            {
                break;
            }
        }
        Ok(names)
    }

    /// Names still required before the frame's node is complete
    fn missing_names(&self, automaton: &Automaton, frame: &Frame) -> Result<Vec<QName>> {
        let doc = self.doc(frame.doc)?;
        let node = automaton.node(doc.automaton_node)?;
        let mut names = Vec::new();
        match node.kind() {
            NodeKind::Wildcard(_) => {}
            NodeKind::Choice | NodeKind::SubstitutionGroup => {
                match doc.current_children().and_then(|c| c.keys().next()) {
                    Some(&chosen) => {
                        names = automaton.required_names(automaton.edge(doc.automaton_node, chosen)?)
                    }
                    None => names = automaton.required_names(doc.automaton_node),
                }
            }
            NodeKind::Element(_) | NodeKind::Sequence | NodeKind::All => {
                for (position, &edge) in node.next_states().iter().enumerate() {
                    if self.edge_satisfied(automaton, doc, position)? {
                        continue;
                    }
                    for name in automaton.required_names(edge) {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                    if !matches!(node.kind(), NodeKind::All) {
                        break;
                    }
                }
            }
        }
        Ok(names)
    }

    fn path_string(&self) -> String {
        let mut path = String::new();
        for frame in &self.frames {
            if let Some(name) = self.nodes.get(frame.doc.0).and_then(|doc| doc.name(doc.iteration)) {
                path.push('/');
                path.push_str(&name.local_name);
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    fn mismatch(&self, automaton: &Automaton, name: &QName, reason: Option<&str>) -> Result<ValidationFailure> {
        let message = if self.frames.is_empty() && self.root.is_some() {
            format!("element {} after the root element was closed", name)
        } else if self.frames.is_empty() {
            format!("unexpected root element {}", name)
        } else {
            format!("unexpected element {}", name)
        };
        let mut failure = ValidationFailure::new(message)
            .with_name(name.clone())
            .with_expected(self.expected_names(automaton)?)
            .with_path(self.path_string());
        if let Some(reason) = reason {
            failure = failure.with_reason(reason);
        }
        Ok(failure)
    }

    fn incomplete(&self, automaton: &Automaton, frame: &Frame) -> Result<ValidationFailure> {
        let doc = self.doc(frame.doc)?;
        let label = match doc.name(doc.iteration) {
            Some(name) => format!("element {}", name),
            None => self.frame_node(automaton, frame)?.node_type().to_string(),
        };
        Ok(ValidationFailure::new(format!("content of {} is incomplete", label))
            .with_expected(self.missing_names(automaton, frame)?)
            .with_path(self.path_string()))
    }

    fn apply_route(
        &mut self,
        automaton: &Automaton,
        route: &Route,
        name: &QName,
        nil: bool,
        event: usize,
    ) -> Result<()> {
        trace!(exits = route.exits, enters = ?route.enters, name = %name, "Applying route");
        for _ in 0..route.exits {
            self.exit()?;
        }
        if self.frames.is_empty() {
            self.enter_root(automaton);
        }
        for &position in &route.enters {
            self.enter(automaton, position)?;
        }

        let id = self
            .frames
            .last()
            .map(|frame| frame.doc)
            .ok_or_else(|| Error::internal("route left no open node"))?;
        let nil = nil && matches!(automaton.node(self.doc(id)?.automaton_node)?.kind(), NodeKind::Element(_));
        if let Some(frame) = self.frames.last_mut() {
            frame.nil = nil;
            frame.event = event;
        }
        let doc = self.doc_mut(id)?;
        let iteration = doc.iteration;
        doc.names.insert(iteration, name.clone());
        if nil {
            doc.nil.insert(iteration);
        }
        Ok(())
    }

    fn enter_root(&mut self, automaton: &Automaton) {
        let id = DocId(self.nodes.len());
        self.nodes.push(DocumentNode::new(automaton.start(), None, None));
        self.root = Some(id);
        self.steps.push(PathStep::new(
            id,
            Direction::Child,
            1,
            Undo::Enter {
                previous_position: None,
            },
        ));
        self.frames.push(Frame::new(id));
    }

    fn enter(&mut self, automaton: &Automaton, position: usize) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::internal("no open node to enter from"))?;
        let parent_id = frame.doc;
        let previous_position = frame.position.replace(position);

        let parent = self.doc(parent_id)?;
        let parent_iteration = parent.iteration;
        let existing = parent.child(parent_iteration, position);
        let edge = automaton.edge(parent.automaton_node, position)?;

        let (id, direction) = match existing {
            Some(child) => {
                self.doc_mut(child)?.iteration += 1;
                (child, Direction::Sibling)
            }
            None => {
                let id = DocId(self.nodes.len());
                self.nodes
                    .push(DocumentNode::new(edge, Some(parent_id), Some(position)));
                self.doc_mut(parent_id)?
                    .children
                    .entry(parent_iteration)
                    .or_default()
                    .insert(position, id);
                (id, Direction::Child)
            }
        };

        let iteration = self.doc(id)?.iteration;
        let mut step = PathStep::new(id, direction, iteration, Undo::Enter { previous_position });
        step.position = Some(position);
        self.steps.push(step);
        self.frames.push(Frame::new(id));
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::internal("no open node to leave"))?;
        let doc = frame.doc;
        let iteration = self.doc(doc)?.iteration;
        self.steps
            .push(PathStep::new(doc, Direction::Parent, iteration, Undo::Exit(frame)));
        Ok(())
    }

    fn skip_start(&mut self, name: &QName) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::internal("no wildcard to skip under"))?;
        frame.skip_depth += 1;
        let doc = frame.doc;
        let iteration = self.doc(doc)?.iteration;
        let mut step = PathStep::new(doc, Direction::SkipStart, iteration, Undo::Nothing);
        step.name = Some(name.clone());
        self.steps.push(step);
        Ok(())
    }

    fn skip_end(&mut self) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::internal("no wildcard to skip under"))?;
        frame.skip_depth = frame
            .skip_depth
            .checked_sub(1)
            .ok_or_else(|| Error::internal("no skipped element to end"))?;
        let doc = frame.doc;
        let iteration = self.doc(doc)?.iteration;
        self.steps
            .push(PathStep::new(doc, Direction::SkipEnd, iteration, Undo::Nothing));
        Ok(())
    }

    fn content(&mut self, doc: DocId, text: &str) -> Result<()> {
        let iteration = self.doc(doc)?.iteration;
        let mut step = PathStep::new(doc, Direction::Content, iteration, Undo::Nothing);
        step.text = Some(text.to_string());
        self.steps.push(step);
        Ok(())
    }

    fn undo_to(&mut self, mark: usize) -> Result<()> {
        while self.steps.len() > mark {
            self.undo_last()?;
        }
        Ok(())
    }

    fn undo_last(&mut self) -> Result<()> {
        let step = self
            .steps
            .pop()
            .ok_or_else(|| Error::internal("no step to undo"))?;
        match step.undo {
            Undo::Enter { previous_position } => {
                self.frames.pop();
                if step.direction == Direction::Child {
                    if step.doc.0 + 1 != self.nodes.len() {
                        return Err(Error::internal(format!(
                            "document node {} is not the newest",
                            step.doc
                        )));
                    }
                    let node = self
                        .nodes
                        .pop()
                        .ok_or_else(|| Error::internal("document node arena is empty"))?;
                    match (node.parent, node.position) {
                        (Some(parent), Some(position)) => {
                            let parent = self.doc_mut(parent)?;
                            let iteration = parent.iteration;
                            if let Some(children) = parent.children.get_mut(&iteration) {
                                children.remove(&position);
                                if children.is_empty() {
                                    parent.children.remove(&iteration);
                                }
                            }
                        }
                        _ => self.root = None,
                    }
                } else {
                    let doc = self.doc_mut(step.doc)?;
                    let iteration = doc.iteration;
                    doc.names.remove(&iteration);
                    doc.nil.remove(&iteration);
                    doc.iteration -= 1;
                }
                if let Some(frame) = self.frames.last_mut() {
                    frame.position = previous_position;
                }
            }
            Undo::Exit(frame) => self.frames.push(frame),
            Undo::Nothing => match step.direction {
                Direction::SkipStart => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.skip_depth = frame.skip_depth.saturating_sub(1);
                    }
                }
                Direction::SkipEnd => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.skip_depth += 1;
                    }
                }
                _ => {}
            },
        }
        Ok(())
    }
}
