use crate::join::JoinDef;
use flowcore::{tag_name, DefinitionError, Event, Step};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where events with a given tag go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Step(usize),
    Join(usize),
}

pub(crate) struct RegisteredStep<E: Event> {
    pub(crate) step: Arc<dyn Step<E>>,
    pub(crate) name: String,
    pub(crate) accepts: Vec<E::Tag>,
    pub(crate) produces: HashSet<E::Tag>,
}

/// Summary of a registered step, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    pub name: String,
    pub accepts: Vec<String>,
    pub produces: Vec<String>,
}

/// Summary of a declared join, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    pub name: String,
    pub accepts: Vec<String>,
    pub required: usize,
    pub produces: String,
}

/// Build-time collection of steps and joins.
///
/// Routing conflicts are rejected as each step or join is added; graph-wide
/// checks (dangling outputs, unproduced inputs, reachability) run in [`build`].
///
/// [`build`]: StepRegistry::build
pub struct StepRegistry<E: Event> {
    name: String,
    start: E::Tag,
    terminal: E::Tag,
    steps: Vec<RegisteredStep<E>>,
    joins: Vec<JoinDef<E>>,
    routes: HashMap<E::Tag, Route>,
}

impl<E: Event> StepRegistry<E> {
    pub fn new(name: impl Into<String>, start: E::Tag, terminal: E::Tag) -> Self {
        Self {
            name: name.into(),
            start,
            terminal,
            steps: Vec::new(),
            joins: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Register a plain consumer step.
    pub fn register(&mut self, step: Arc<dyn Step<E>>) -> Result<(), DefinitionError> {
        let name = step.name().to_string();
        tracing::debug!("Registering step: {}", name);

        if self.steps.iter().any(|s| s.name == name) {
            return Err(DefinitionError::DuplicateStep(name));
        }

        let accepts = dedup(step.accepts());
        if accepts.is_empty() {
            return Err(DefinitionError::NoAcceptedTags { step: name });
        }
        self.claim(&accepts, &name)?;

        let index = self.steps.len();
        for tag in &accepts {
            self.routes.insert(*tag, Route::Step(index));
        }
        self.steps.push(RegisteredStep {
            produces: step.produces().into_iter().collect(),
            step,
            name,
            accepts,
        });
        Ok(())
    }

    /// Declare a join. Events with its accepted tags are buffered instead of
    /// launching a step.
    pub fn join(&mut self, join: JoinDef<E>) -> Result<(), DefinitionError> {
        let name = join.name().to_string();
        tracing::debug!("Declaring join: {}", name);

        if self.joins.iter().any(|j| j.name() == name) {
            return Err(DefinitionError::DuplicateJoin(name));
        }
        if join.required() == 0 || join.accepts().is_empty() {
            return Err(DefinitionError::InvalidJoinCount { join: name });
        }

        let accepts = dedup(join.accepts().to_vec());
        self.claim(&accepts, &name)?;

        let index = self.joins.len();
        for tag in accepts {
            self.routes.insert(tag, Route::Join(index));
        }
        self.joins.push(join);
        Ok(())
    }

    fn claim(&self, tags: &[E::Tag], claimant: &str) -> Result<(), DefinitionError> {
        for tag in tags {
            if *tag == self.terminal {
                return Err(DefinitionError::TerminalConsumed {
                    terminal: tag_name(tag),
                    step: claimant.to_string(),
                });
            }
            if let Some(route) = self.routes.get(tag) {
                return Err(DefinitionError::AmbiguousRouting {
                    tag: tag_name(tag),
                    first: self.route_name(*route).to_string(),
                    second: claimant.to_string(),
                });
            }
        }
        Ok(())
    }

    fn route_name(&self, route: Route) -> &str {
        match route {
            Route::Step(i) => &self.steps[i].name,
            Route::Join(i) => self.joins[i].name(),
        }
    }

    /// Validate the whole graph and freeze it.
    pub fn build(self) -> Result<Workflow<E>, DefinitionError> {
        if !self.routes.contains_key(&self.start) {
            return Err(DefinitionError::NoStartConsumer(tag_name(&self.start)));
        }

        let mut produced: HashSet<E::Tag> = HashSet::from([self.start]);
        for step in &self.steps {
            for tag in &step.produces {
                if *tag != self.terminal && !self.routes.contains_key(tag) {
                    return Err(DefinitionError::DanglingOutput {
                        step: step.name.clone(),
                        tag: tag_name(tag),
                    });
                }
                produced.insert(*tag);
            }
        }
        for join in &self.joins {
            let tag = join.produces();
            if tag != self.terminal && !self.routes.contains_key(&tag) {
                return Err(DefinitionError::DanglingOutput {
                    step: join.name().to_string(),
                    tag: tag_name(&tag),
                });
            }
            produced.insert(tag);
        }

        // Sorted so the reported offender does not depend on hash order.
        let mut routed: Vec<_> = self.routes.iter().collect();
        routed.sort_by_key(|(_, route)| match route {
            Route::Step(i) => (0, *i),
            Route::Join(i) => (1, *i),
        });
        for (tag, route) in routed {
            if !produced.contains(tag) {
                return Err(DefinitionError::UnproducedInput {
                    step: self.route_name(*route).to_string(),
                    tag: tag_name(tag),
                });
            }
        }

        self.check_reachability()?;

        tracing::info!(
            workflow = %self.name,
            steps = self.steps.len(),
            joins = self.joins.len(),
            "Workflow definition validated"
        );

        let step_index = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        Ok(Workflow {
            name: self.name,
            start: self.start,
            terminal: self.terminal,
            steps: self.steps,
            joins: self.joins,
            routes: self.routes,
            step_index,
        })
    }

    /// Tag-level graph: tag -> step/join -> produced tag.
    fn check_reachability(&self) -> Result<(), DefinitionError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut tag_nodes: HashMap<E::Tag, NodeIndex> = HashMap::new();
        let mut tag_node = |graph: &mut DiGraph<String, ()>, tag: E::Tag| {
            *tag_nodes
                .entry(tag)
                .or_insert_with(|| graph.add_node(tag_name(&tag)))
        };

        let start = tag_node(&mut graph, self.start);
        let terminal = tag_node(&mut graph, self.terminal);

        let mut step_nodes = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let node = graph.add_node(step.name.clone());
            for tag in &step.accepts {
                let from = tag_node(&mut graph, *tag);
                graph.add_edge(from, node, ());
            }
            for tag in &step.produces {
                let to = tag_node(&mut graph, *tag);
                graph.add_edge(node, to, ());
            }
            step_nodes.push(node);
        }
        for join in &self.joins {
            let node = graph.add_node(join.name().to_string());
            for tag in join.accepts() {
                let from = tag_node(&mut graph, *tag);
                graph.add_edge(from, node, ());
            }
            let to = tag_node(&mut graph, join.produces());
            graph.add_edge(node, to, ());
        }

        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&graph, start);
        while let Some(node) = dfs.next(&graph) {
            reachable.insert(node);
        }

        if !reachable.contains(&terminal) {
            return Err(DefinitionError::TerminalUnreachable(tag_name(&self.terminal)));
        }

        for (step, node) in self.steps.iter().zip(step_nodes) {
            if !reachable.contains(&node) {
                tracing::warn!(workflow = %self.name, step = %step.name, "Step is unreachable from the start tag");
            }
        }

        if is_cyclic_directed(&graph) {
            tracing::debug!(workflow = %self.name, "Workflow graph contains a cycle");
        }

        Ok(())
    }
}

fn dedup<T: Copy + Eq + std::hash::Hash>(tags: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    tags.into_iter().filter(|t| seen.insert(*t)).collect()
}

/// A validated, immutable step graph. Share it across runs behind an `Arc`.
pub struct Workflow<E: Event> {
    name: String,
    start: E::Tag,
    terminal: E::Tag,
    pub(crate) steps: Vec<RegisteredStep<E>>,
    pub(crate) joins: Vec<JoinDef<E>>,
    routes: HashMap<E::Tag, Route>,
    step_index: HashMap<String, usize>,
}

impl<E: Event> Workflow<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_tag(&self) -> E::Tag {
        self.start
    }

    pub fn terminal_tag(&self) -> E::Tag {
        self.terminal
    }

    pub(crate) fn route(&self, tag: E::Tag) -> Option<Route> {
        self.routes.get(&tag).copied()
    }

    pub(crate) fn step_named(&self, name: &str) -> Option<&RegisteredStep<E>> {
        self.step_index.get(name).map(|i| &self.steps[*i])
    }

    pub fn steps(&self) -> Vec<StepInfo> {
        self.steps
            .iter()
            .map(|s| {
                let mut produces: Vec<String> = s.produces.iter().map(tag_name).collect();
                produces.sort();
                StepInfo {
                    name: s.name.clone(),
                    accepts: s.accepts.iter().map(tag_name).collect(),
                    produces,
                }
            })
            .collect()
    }

    pub fn joins(&self) -> Vec<JoinInfo> {
        self.joins
            .iter()
            .map(|j| JoinInfo {
                name: j.name().to_string(),
                accepts: j.accepts().iter().map(tag_name).collect(),
                required: j.required(),
                produces: tag_name(&j.produces()),
            })
            .collect()
    }
}
