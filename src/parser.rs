//! XML input documents.
//!
//! Two documents describe a problem instance:
//!
//! - the *application* lists `Node` elements (`Id`, `Name`, `WCET`,
//!   `Period`, `Deadline`, optional `Offset`, optional `CpuId` / `CoreId`
//!   pin), `TaskGraph` elements whose `Edge` children carry `Source`,
//!   `Dest` and `Cost`, and optional `Chain` elements (`Name`, `Budget`,
//!   optional `Priority`) listing `Runnable` children by `Name`;
//! - the *architecture* lists `Cpu` elements (identified by `Id`, or by
//!   `Name` when `Id` is absent) whose `Core` children carry an `Id`.
//!
//! Elements are collected wherever they appear in the document tree.
//! Edge endpoints and chain runnables are resolved against task ids first
//! and task names second; task names must therefore be unique. A `CoreId`
//! of `-1` pins a task to its CPU without choosing a core. `MaxJitter` and
//! `MacroTick` are accepted but not modeled. Any failure aborts the whole
//! parse with a single [`ParseError`]; nothing partial is returned.
//!
//! Progress notes go to an explicit [`Diagnostics`] sink instead of any
//! global output stream.

use crate::error::ParseError;
use crate::model::{Affinity, Chain, CoreId, Cpu, Edge, Task, TaskGraph, Topology};
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// `CoreId` value meaning "any core of the pinned CPU".
const ANY_CORE: &str = "-1";

/// Receiver for parser progress notes.
pub trait Diagnostics {
    fn note(&mut self, message: &str);
}

/// Discards every note.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn note(&mut self, _message: &str) {}
}

/// Forwards notes to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn note(&mut self, message: &str) {
        log::debug!("{message}");
    }
}

impl Diagnostics for Vec<String> {
    fn note(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Parses an application document into a [`TaskGraph`].
pub fn parse_application(
    xml: &str,
    diag: &mut dyn Diagnostics,
) -> Result<TaskGraph, ParseError> {
    let doc = Document::parse(xml).map_err(|e| ParseError::Xml(e.to_string()))?;

    let mut tasks = Vec::new();
    for node in elements(&doc, "Node") {
        let mut task = Task::new(
            required(node, "Node", "Id")?,
            required(node, "Node", "Name")?,
            number(node, "Node", "WCET")?,
            number(node, "Node", "Period")?,
            number(node, "Node", "Deadline")?,
        );
        if node.has_attribute("Offset") {
            task = task.with_offset(number(node, "Node", "Offset")?);
        }
        task = task.with_affinity(affinity(node)?);
        if node.has_attribute("MaxJitter") {
            diag.note(&format!("task {}: MaxJitter ignored", task.id()));
        }
        diag.note(&format!(
            "task {} ({}): wcet={} period={} deadline={} affinity={:?}",
            task.id(),
            task.name(),
            task.wcet(),
            task.period(),
            task.deadline(),
            task.affinity()
        ));
        tasks.push(task);
    }

    let (edges, chains) = {
        let refs = TaskRefs::new(&tasks)?;
        (
            collect_edges(&doc, &refs, diag)?,
            collect_chains(&doc, &refs, diag)?,
        )
    };

    diag.note(&format!(
        "{} tasks, {} edges, {} chains",
        tasks.len(),
        edges.len(),
        chains.len()
    ));
    TaskGraph::new(tasks, edges)?.with_chains(chains)
}

/// Optional `CpuId` / `CoreId` pin of a `Node`.
fn affinity(node: Node<'_, '_>) -> Result<Affinity, ParseError> {
    match (node.attribute("CpuId"), node.attribute("CoreId")) {
        (None, None) => Ok(Affinity::Any),
        (None, Some(_)) => Err(ParseError::MissingAttribute {
            element: "Node",
            attribute: "CpuId",
        }),
        (Some(cpu), None) => Ok(Affinity::Cpu(cpu.to_string())),
        (Some(cpu), Some(core)) if core.trim() == ANY_CORE => Ok(Affinity::Cpu(cpu.to_string())),
        (Some(cpu), Some(core)) => Ok(Affinity::Core(CoreId::new(cpu, core))),
    }
}

/// Resolves task references by id first, then by name.
struct TaskRefs<'t> {
    ids: HashSet<&'t str>,
    by_name: HashMap<&'t str, &'t str>,
}

impl<'t> TaskRefs<'t> {
    /// # Errors
    /// [`ParseError::DuplicateId`] when two tasks share a name.
    fn new(tasks: &'t [Task]) -> Result<Self, ParseError> {
        let ids = tasks.iter().map(Task::id).collect();
        let mut by_name = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if by_name.insert(task.name(), task.id()).is_some() {
                return Err(ParseError::DuplicateId {
                    kind: "task name",
                    id: task.name().to_string(),
                });
            }
        }
        Ok(Self { ids, by_name })
    }

    fn resolve(&self, reference: &str) -> Option<&'t str> {
        self.ids
            .get(reference)
            .or_else(|| self.by_name.get(reference))
            .copied()
    }
}

fn collect_edges(
    doc: &Document<'_>,
    refs: &TaskRefs<'_>,
    diag: &mut dyn Diagnostics,
) -> Result<Vec<Edge>, ParseError> {
    let mut edges = Vec::new();
    for group in elements(doc, "TaskGraph") {
        let group_name = group.attribute("Name");
        for edge in group.descendants().filter(|n| n.has_tag_name("Edge")) {
            let source = required(edge, "Edge", "Source")?;
            let dest = required(edge, "Edge", "Dest")?;
            let cost = number(edge, "Edge", "Cost")?;

            let dangling = |missing: &str| ParseError::DanglingEdge {
                from: source.to_string(),
                to: dest.to_string(),
                missing: missing.to_string(),
            };
            let s = refs.resolve(source).ok_or_else(|| dangling(source))?;
            let d = refs.resolve(dest).ok_or_else(|| dangling(dest))?;

            let mut parsed = Edge::new(s, d, cost);
            if let Some(name) = group_name {
                parsed = parsed.in_group(name);
            }
            diag.note(&format!("edge {s} -> {d} cost={cost}"));
            edges.push(parsed);
        }
    }
    Ok(edges)
}

fn collect_chains(
    doc: &Document<'_>,
    refs: &TaskRefs<'_>,
    diag: &mut dyn Diagnostics,
) -> Result<Vec<Chain>, ParseError> {
    let mut chains = Vec::new();
    for chain in elements(doc, "Chain") {
        let name = required(chain, "Chain", "Name")?;
        let budget = number(chain, "Chain", "Budget")?;
        let priority = if chain.has_attribute("Priority") {
            let raw = number(chain, "Chain", "Priority")?;
            u32::try_from(raw).map_err(|_| ParseError::InvalidNumber {
                element: "Chain",
                attribute: "Priority",
                value: raw.to_string(),
            })?
        } else {
            0
        };
        // Unresolved names are kept so `TaskGraph::with_chains` reports them.
        let runnables = chain
            .descendants()
            .filter(|n| n.has_tag_name("Runnable"))
            .map(|r| {
                let reference = required(r, "Runnable", "Name")?;
                Ok(refs.resolve(reference).unwrap_or(reference))
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        diag.note(&format!(
            "chain {name}: budget={budget} priority={priority} [{}]",
            runnables.join(", ")
        ));
        chains.push(Chain::new(name, budget, priority, runnables));
    }
    Ok(chains)
}

/// Parses an architecture document into a [`Topology`].
pub fn parse_architecture(
    xml: &str,
    diag: &mut dyn Diagnostics,
) -> Result<Topology, ParseError> {
    let doc = Document::parse(xml).map_err(|e| ParseError::Xml(e.to_string()))?;

    let mut cpus = Vec::new();
    for cpu in elements(&doc, "Cpu") {
        let id = cpu
            .attribute("Id")
            .or_else(|| cpu.attribute("Name"))
            .ok_or(ParseError::MissingAttribute {
                element: "Cpu",
                attribute: "Id",
            })?;
        let cores = cpu
            .children()
            .filter(|n| n.has_tag_name("Core"))
            .map(|core| {
                if core.has_attribute("MacroTick") {
                    diag.note(&format!("cpu {id}: MacroTick ignored"));
                }
                required(core, "Core", "Id")
            })
            .collect::<Result<Vec<_>, _>>()?;
        diag.note(&format!("cpu {id}: cores [{}]", cores.join(", ")));
        cpus.push(Cpu::new(id, cores));
    }

    Topology::new(cpus)
}

/// Reads and parses both documents of a problem instance.
pub fn load_problem(
    application: impl AsRef<Path>,
    architecture: impl AsRef<Path>,
    diag: &mut dyn Diagnostics,
) -> Result<(TaskGraph, Topology), ParseError> {
    let graph = parse_application(&read(application.as_ref())?, diag)?;
    let topology = parse_architecture(&read(architecture.as_ref())?, diag)?;
    Ok((graph, topology))
}

fn read(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn elements<'a, 'input>(
    doc: &'a Document<'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.descendants().filter(move |n| n.has_tag_name(tag))
}

fn required<'a>(
    node: Node<'a, '_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<&'a str, ParseError> {
    node.attribute(attribute)
        .ok_or(ParseError::MissingAttribute { element, attribute })
}

fn number(
    node: Node<'_, '_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<u64, ParseError> {
    let raw = required(node, element, attribute)?;
    raw.trim().parse().map_err(|_| ParseError::InvalidNumber {
        element,
        attribute,
        value: raw.to_string(),
    })
}
