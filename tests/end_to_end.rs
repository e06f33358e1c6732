//! End-to-end optimization runs.

use std::io::Write;
use task_anneal::anneal::{optimize, AnnealConfig, AnnealingScheduler};
use task_anneal::cost::CostEvaluator;
use task_anneal::model::{CoreId, Cpu, Edge, Task, TaskGraph, Topology};
use task_anneal::parser::{load_problem, LogDiagnostics};
use task_anneal::SchedError;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn three_task_chain() -> (TaskGraph, Topology) {
    let graph = TaskGraph::new(
        vec![
            Task::new("T1", "T1", 2, 10, 10),
            Task::new("T2", "T2", 3, 10, 10),
            Task::new("T3", "T3", 1, 10, 10),
        ],
        vec![Edge::new("T1", "T2", 1), Edge::new("T2", "T3", 1)],
    )
    .unwrap();
    let topology = Topology::new(vec![Cpu::new("cpu0", ["0", "1"])]).unwrap();
    (graph, topology)
}

fn generous() -> AnnealConfig {
    AnnealConfig::default()
        .with_initial_temperature(100.0)
        .with_cooling_rate(0.01)
        .with_seed(42)
}

#[test]
fn chain_on_two_cores_meets_every_deadline() {
    init_logging();
    let (graph, topology) = three_task_chain();
    let result = optimize(&graph, &topology, &generous()).unwrap();

    assert!(result.schedule.is_feasible());
    let breakdown = CostEvaluator::new(generous().weights())
        .breakdown(&result.best_plan)
        .unwrap();
    assert_eq!(breakdown.lateness, 0);
    assert_eq!(breakdown.missed_deadlines, 0);

    // Keeping the whole chain on one core avoids both transfers: 2 + 3 + 1.
    assert_eq!(result.best_cost, 6.0);
    let core = result.best_plan.core_of("T1").unwrap();
    assert_eq!(result.best_plan.core_of("T2").unwrap(), core);
    assert_eq!(result.best_plan.core_of("T3").unwrap(), core);
    assert!(result.best_cost <= result.initial_cost);
}

#[test]
fn tight_deadlines_force_parallel_cores() {
    init_logging();
    // Two independent tasks with deadline == WCET only fit side by side.
    let graph = TaskGraph::new(
        vec![Task::new("A", "A", 5, 10, 5), Task::new("B", "B", 5, 10, 5)],
        vec![],
    )
    .unwrap();
    let topology = Topology::new(vec![Cpu::new("cpu0", ["0"]), Cpu::new("cpu1", ["0"])]).unwrap();
    let result = optimize(&graph, &topology, &generous()).unwrap();

    assert!(result.schedule.is_feasible());
    assert_ne!(
        result.best_plan.core_of("A").unwrap(),
        result.best_plan.core_of("B").unwrap()
    );
    assert_eq!(result.best_cost, 5.0);
}

#[test]
fn cycle_aborts_before_any_iteration() {
    let graph = TaskGraph::new(
        vec![Task::new("A", "A", 1, 10, 10), Task::new("B", "B", 1, 10, 10)],
        vec![Edge::new("A", "B", 1), Edge::new("B", "A", 1)],
    )
    .unwrap();
    let topology = Topology::new(vec![Cpu::new("cpu0", ["0", "1"])]).unwrap();

    match AnnealingScheduler::new(&graph, &topology, &generous()) {
        Err(SchedError::CyclicDependency { tasks }) => assert_eq!(tasks, ["A", "B"]),
        Err(other) => panic!("expected cyclic dependency, got {other}"),
        Ok(_) => panic!("cyclic graph accepted"),
    }
    assert!(matches!(
        optimize(&graph, &topology, &generous()),
        Err(SchedError::CyclicDependency { .. })
    ));
}

#[test]
fn optimizes_instance_loaded_from_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("case.tsk");
    let arch = dir.path().join("case.cfg");

    let mut f = std::fs::File::create(&app).unwrap();
    write!(
        f,
        r#"<Application>
  <Node Id="1" Name="sense" WCET="2" Period="10" Deadline="10"/>
  <Node Id="2" Name="plan" WCET="3" Period="10" Deadline="10"/>
  <Node Id="3" Name="act" WCET="1" Period="10" Deadline="10"/>
  <TaskGraph Name="control">
    <Edge Source="sense" Dest="plan" Cost="1"/>
    <Edge Source="plan" Dest="act" Cost="1"/>
  </TaskGraph>
</Application>"#
    )
    .unwrap();
    std::fs::write(
        &arch,
        r#"<Architecture><Cpu Id="0"><Core Id="0"/><Core Id="1"/></Cpu></Architecture>"#,
    )
    .unwrap();

    let (graph, topology) = load_problem(&app, &arch, &mut LogDiagnostics).unwrap();
    let result = optimize(&graph, &topology, &generous()).unwrap();

    assert!(result.schedule.is_feasible());
    let rows = result.schedule.entries();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.end <= 10));
}

#[test]
fn pinned_tasks_and_chain_budget_from_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("pinned.tsk");
    let arch = dir.path().join("pinned.cfg");

    std::fs::write(
        &app,
        r#"<Application>
  <Node Id="1" Name="sense" WCET="2" Period="10" Deadline="10" CpuId="0" CoreId="0"/>
  <Node Id="2" Name="plan" WCET="3" Period="10" Deadline="10"/>
  <Node Id="3" Name="act" WCET="1" Period="10" Deadline="10" CpuId="1" CoreId="-1"/>
  <TaskGraph Name="control">
    <Edge Source="sense" Dest="plan" Cost="1"/>
    <Edge Source="plan" Dest="act" Cost="1"/>
  </TaskGraph>
  <Chain Name="control-loop" Budget="7" Priority="1">
    <Runnable Name="sense"/>
    <Runnable Name="plan"/>
    <Runnable Name="act"/>
  </Chain>
</Application>"#,
    )
    .unwrap();
    std::fs::write(
        &arch,
        r#"<Architecture>
  <Cpu Id="0"><Core Id="0" MacroTick="9999999"/><Core Id="1" MacroTick="9999999"/></Cpu>
  <Cpu Id="1"><Core Id="0" MacroTick="9999999"/></Cpu>
</Architecture>"#,
    )
    .unwrap();

    let (graph, topology) = load_problem(&app, &arch, &mut LogDiagnostics).unwrap();
    assert_eq!(graph.chains().len(), 1);
    let result = optimize(&graph, &topology, &generous()).unwrap();

    let plan = &result.best_plan;
    assert_eq!(plan.core_of("1").unwrap(), &CoreId::new("0", "0"));
    assert_eq!(plan.core_of("3").unwrap(), &CoreId::new("1", "0"));
    assert!(result.schedule.is_feasible());
    assert!(result.schedule.chain_overruns().is_empty());
    // One transfer is unavoidable: makespan 7 plus communication 1.
    assert_eq!(result.best_cost, 8.0);
    assert_ne!(plan.core_of("2").unwrap(), &CoreId::new("0", "1"));
}
