use super::*;
use crate::backend::SearchAlgorithm;
use crate::primitive::Status;
use crate::testutil::LineIo;
use sprs::{CsMat, TriMat};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;
use tempfile::{tempdir, TempDir};

#[derive(Clone, Debug, PartialEq)]
enum Event {
    TimeLimit(f64),
    Algorithm(SearchAlgorithm),
    NodeLimit(u64),
    Start(Vec<f64>),
    Optimize,
}

type Log = Rc<RefCell<Vec<Event>>>;

/// Backend stand-in: replays queued answers, repeating the last one.
struct Stub {
    problem: EnergyProblem,
    answers: Rc<RefCell<VecDeque<(OptStatus, Vec<f64>)>>>,
    log: Log,
    fail_read: bool,
    update_status: OptStatus,
}

impl Optimizer for Stub {
    fn read(&mut self, dir: &Path) -> Result<(), ProblemError> {
        if self.fail_read {
            return Err(ProblemError::Io {
                path: dir.join("linobj.csv"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(())
    }

    fn problem(&self) -> Option<&EnergyProblem> {
        Some(&self.problem)
    }

    fn set_time_limit(&mut self, seconds: f64) {
        self.log.borrow_mut().push(Event::TimeLimit(seconds));
    }

    fn set_algorithm(&mut self, algorithm: SearchAlgorithm) {
        self.log.borrow_mut().push(Event::Algorithm(algorithm));
    }

    fn set_node_limit(&mut self, nodes: u64) {
        self.log.borrow_mut().push(Event::NodeLimit(nodes));
    }

    fn set_starting_point(&mut self, x0: &[f64]) {
        self.log.borrow_mut().push(Event::Start(x0.to_vec()));
    }

    fn update(&mut self) -> OptStatus {
        self.update_status
    }

    fn optimize(&mut self, _sense: ObjSense) -> (OptStatus, Vec<f64>) {
        self.log.borrow_mut().push(Event::Optimize);
        let mut answers = self.answers.borrow_mut();
        if answers.len() > 1 {
            answers.pop_front().unwrap_or((OptStatus::Error(9), Vec::new()))
        } else {
            answers
                .front()
                .cloned()
                .unwrap_or((OptStatus::Error(9), Vec::new()))
        }
    }
}

/// Factory producing stubs that share one answer queue and one log.
struct StubFactory {
    problem: EnergyProblem,
    answers: Rc<RefCell<VecDeque<(OptStatus, Vec<f64>)>>>,
    log: Log,
    fail_read: bool,
    update_status: OptStatus,
    created: u32,
}

impl StubFactory {
    fn new(answers: Vec<(OptStatus, Vec<f64>)>) -> Self {
        Self {
            problem: fixture_problem(),
            answers: Rc::new(RefCell::new(answers.into())),
            log: Rc::default(),
            fail_read: false,
            update_status: OptStatus::Ok,
            created: 0,
        }
    }

    fn make(&mut self, _backend: Backend) -> Result<Box<dyn Optimizer>, ConfigError> {
        self.created += 1;
        Ok(Box::new(Stub {
            problem: self.problem.clone(),
            answers: Rc::clone(&self.answers),
            log: Rc::clone(&self.log),
            fail_read: self.fail_read,
            update_status: self.update_status,
        }))
    }

    fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    fn node_limits(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::NodeLimit(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}

/// Three primitive slots plus one cluster slot.
/// Linear [1, -2, -2, 0.5], pairwise 0.5 on (1,2), constraint x0*x3 <= 0.
fn fixture_problem() -> EnergyProblem {
    let mut l = TriMat::new((4, 1));
    for (i, v) in [1.0, -2.0, -2.0, 0.5].into_iter().enumerate() {
        l.add_triplet(i, 0, v);
    }
    let mut q = TriMat::new((4, 4));
    q.add_triplet(1, 2, 0.5);
    let mut qc = TriMat::new((4, 4));
    qc.add_triplet(0, 3, 1.0);
    EnergyProblem::with_constraints(
        l.to_csc(),
        q.to_csc(),
        CsMat::zero((1, 4)),
        vec![qc.to_csc()],
        vec![(f64::NEG_INFINITY, 0.0)],
    )
    .unwrap()
}

const FIXTURE_FILES: [(&str, &str); 4] = [
    ("linobj.csv", "4,1\n0,0,1\n1,0,-2\n2,0,-2\n3,0,0.5\n"),
    ("qo.csv", "4,4\n1,2,0.5\n"),
    ("bounds.csv", "-inf,0\n"),
    ("qc_0.csv", "4,4\n0,3,1\n"),
];

/// Workspace: `problem/` directory and a candidates file for iteration 5.
fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempdir().unwrap();
    let problem = dir.path().join("problem");
    fs::create_dir_all(&problem).unwrap();
    for (name, text) in FIXTURE_FILES {
        fs::write(problem.join(name), text).unwrap();
    }
    let candidates = dir.path().join("candidates_it5.csv");
    fs::write(&candidates, "0,0,2\n0,1,-1\n1,0,-1\n1,1,2\n2,0,-1\n").unwrap();
    (dir, problem, candidates)
}

fn cfg(problem: &Path) -> SolveConfig {
    SolveConfig::new(Backend::Bonmin, problem)
}

#[test]
fn degenerate_answers_escalate_then_fail() {
    let (_dir, problem, _) = workspace();
    let config = cfg(&problem);
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![0.0; 4])]);
    let err = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap_err();
    assert!(matches!(err, SolveError::AttemptsExhausted { attempts: 2 }));
    assert_eq!(f.created, 2);
    assert_eq!(f.node_limits(), vec![100, 200]);
    assert_eq!(terminal_state(&err), DriverState::Exhausted);
    let optimizes = f.events().iter().filter(|e| **e == Event::Optimize).count();
    assert_eq!(optimizes, 2);
}

#[test]
fn attempt_budget_is_configurable() {
    let (_dir, problem, _) = workspace();
    let config = cfg(&problem).with_max_attempts(3);
    let mut f = StubFactory::new(vec![(OptStatus::NodeLimit, Vec::new())]);
    let err = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap_err();
    assert!(matches!(err, SolveError::AttemptsExhausted { attempts: 3 }));
    assert_eq!(f.node_limits(), vec![100, 200, 300]);
}

#[test]
fn zero_sum_vectors_are_rejected_despite_ok_status() {
    assert_eq!(judge(OptStatus::Ok, &[0.0, 0.0, 0.0]), Err(Rejection::ZeroSum));
    assert_eq!(judge(OptStatus::Ok, &[]), Err(Rejection::Empty));
    assert_eq!(
        judge(OptStatus::TimeLimit, &[1.0]),
        Err(Rejection::Optimize(OptStatus::TimeLimit))
    );
    assert_eq!(judge(OptStatus::Ok, &[0.0, 1.0, 1.0]), Ok(()));
    // Literal integer accumulation: cancellation and sub-unit values sum to zero.
    assert_eq!(accumulate_truncated(&[1.0, -1.0]), 0);
    assert_eq!(accumulate_truncated(&[0.4, 0.4, 0.4]), 0);
    assert_eq!(accumulate_truncated(&[0.6, 1.0, 0.9]), 1);
}

#[test]
fn retry_then_success_writes_all_artifacts() {
    let (dir, problem, candidates) = workspace();
    let config = cfg(&problem)
        .with_candidates(&candidates)
        .with_rel_out_dir("out")
        .with_time_limit(30.0);
    let mut f = StubFactory::new(vec![
        (OptStatus::Ok, vec![0.0; 4]),
        (OptStatus::Ok, vec![0.0, 1.0, 1.0, 0.0]),
    ]);
    let report = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.iteration, Some(5));
    assert_eq!((report.selected, report.deferred), (2, 2));
    assert!(report.failures.is_empty());
    assert_eq!(report.energy.data, -4.0);
    assert_eq!(report.energy.pairwise, 0.5);
    assert!(f.events().contains(&Event::TimeLimit(30.0)));
    assert!(f.events().contains(&Event::Algorithm(SearchAlgorithm::BranchAndBound)));

    let prims = dir.path().join("out/primitives_it5.bonmin.csv");
    assert_eq!(report.artifact(ArtifactKind::Primitives), Some(prims.as_path()));
    assert_eq!(
        fs::read_to_string(&prims).unwrap(),
        "0,0,2\n1,0,1\n1,1,2\n2,0,1\n"
    );

    let gv = fs::read_to_string(dir.path().join("out/diag_it5.gv")).unwrap();
    assert!(gv.contains("1 [label=\"p1,0\""));
    assert!(gv.contains("2 [label=\"p2,0\""));
    assert!(gv.contains("3 [label=\"3_off\""));
    assert!(gv.contains("0 -- 3;"));

    assert_eq!(
        fs::read_to_string(dir.path().join("energy.csv")).unwrap(),
        "-3.5,-4,0.5,0\n"
    );
    let x = read_dense_column(&problem.join("x.csv")).unwrap();
    assert_eq!(x, vec![0.0, 1.0, 1.0, 0.0]);
}

#[test]
fn unavailable_backend_is_a_configuration_error() {
    let (_dir, problem, _) = workspace();
    let config = SolveConfig::new(Backend::Gurobi, &problem);
    let err = Driver::new(&config, &LineIo).solve().unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::BackendUnavailable(Backend::Gurobi))
    ));
}

#[test]
fn read_failure_is_not_retried() {
    let (_dir, problem, _) = workspace();
    let config = cfg(&problem);
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![1.0; 4])]);
    f.fail_read = true;
    let err = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap_err();
    assert!(matches!(err, SolveError::Config(ConfigError::Problem(_))));
    assert_eq!(terminal_state(&err), DriverState::Fatal);
    assert_eq!(f.created, 1);
    assert!(f.events().is_empty());
}

#[test]
fn missing_starting_point_stops_before_any_attempt() {
    let (dir, problem, _) = workspace();
    let config = cfg(&problem).with_starting_point(dir.path().join("x0.csv"));
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![1.0; 4])]);
    let err = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::MissingStartingPoint(_))
    ));
    assert_eq!(f.created, 0);
}

#[test]
fn starting_point_reaches_branch_and_bound_backends_only() {
    let (dir, problem, _) = workspace();
    let x0 = dir.path().join("x0.csv");
    fs::write(&x0, "4,1\n1,0,1\n").unwrap();

    let config = cfg(&problem).with_starting_point(&x0);
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![0.0, 1.0, 0.0, 0.0])]);
    Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap();
    assert!(f.events().contains(&Event::Start(vec![0.0, 1.0, 0.0, 0.0])));

    let mut config = config;
    config.backend = Backend::Mosek;
    let mut g = StubFactory::new(vec![(OptStatus::Ok, vec![0.0, 1.0, 0.0, 0.0])]);
    Driver::new(&config, &LineIo)
        .solve_with(|b| g.make(b))
        .unwrap();
    assert!(g.node_limits().is_empty());
    assert!(!g.events().iter().any(|e| matches!(e, Event::Start(_))));
}

#[test]
fn without_candidates_only_solution_and_ledger_are_written() {
    let (dir, problem, _) = workspace();
    let config = cfg(&problem);
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![0.0, 1.0, 0.0, 0.0])]);
    let report = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap();

    assert_eq!(report.iteration, None);
    assert_eq!((report.selected, report.deferred), (0, 0));
    assert!(report.failures.is_empty());
    let kinds: Vec<ArtifactKind> = report.written.iter().map(|(k, _)| *k).collect();
    assert_eq!(kinds, vec![ArtifactKind::Solution, ArtifactKind::EnergyLedger]);

    let x = read_dense_column(&problem.join("x.csv")).unwrap();
    assert_eq!(x, vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(
        fs::read_to_string(dir.path().join("energy.csv")).unwrap(),
        "-2,-2,0,0\n"
    );
}

#[test]
fn failed_update_skips_optimize_and_is_retried() {
    let (_dir, problem, _) = workspace();
    let config = cfg(&problem);
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![0.0, 1.0, 1.0, 0.0])]);
    f.update_status = OptStatus::Error(3);
    let err = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap_err();
    assert!(matches!(err, SolveError::AttemptsExhausted { attempts: 2 }));
    assert_eq!(f.created, 2);
    assert_eq!(f.node_limits(), vec![100, 200]);
    assert!(!f.events().contains(&Event::Optimize));
    assert_eq!(
        run_attempt(&mut Stub {
            problem: fixture_problem(),
            answers: Rc::default(),
            log: Rc::default(),
            fail_read: false,
            update_status: OptStatus::Error(3),
        }),
        Err(Rejection::Update(OptStatus::Error(3)))
    );
}

#[test]
fn large_easy_problem_is_solved_by_the_built_in_backend() {
    let n = 250;
    let dir = tempdir().unwrap();
    let problem = dir.path().join("problem");
    fs::create_dir_all(&problem).unwrap();
    let mut linobj = format!("{n},1\n");
    for i in 0..n {
        linobj.push_str(&format!("{i},0,-1\n"));
    }
    fs::write(problem.join("linobj.csv"), linobj).unwrap();
    fs::write(problem.join("qo.csv"), format!("{n},{n}\n")).unwrap();

    let report = Driver::new(&cfg(&problem), &LineIo).solve().unwrap();
    assert_eq!(report.attempts, 1);
    assert_eq!(report.x, vec![1.0; n]);
    assert_eq!(report.energy.total(), -(n as f64));
}

#[test]
fn short_vector_is_a_structural_mismatch() {
    let (dir, problem, _) = workspace();
    let candidates = dir.path().join("many.csv");
    fs::write(&candidates, "0,0,-1\n0,1,-1\n0,2,-1\n0,3,-1\n0,4,-1\n").unwrap();
    let config = cfg(&problem).with_candidates(&candidates);
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![1.0, 0.0, 0.0, 0.0])]);
    let err = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap_err();
    match err {
        SolveError::Structural(m) => assert_eq!((m.len, m.expected), (4, 5)),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!dir.path().join("energy.csv").exists());
}

#[test]
fn failed_artifact_does_not_block_the_others() {
    let (dir, problem, candidates) = workspace();
    fs::write(dir.path().join("blocked"), "not a directory").unwrap();
    let config = cfg(&problem)
        .with_candidates(&candidates)
        .with_rel_out_dir("blocked");
    let mut f = StubFactory::new(vec![(OptStatus::Ok, vec![0.0, 1.0, 1.0, 0.0])]);
    let report = Driver::new(&config, &LineIo)
        .solve_with(|b| f.make(b))
        .unwrap();
    let failed: Vec<ArtifactKind> = report.failures.iter().map(|e| e.kind).collect();
    assert_eq!(failed, vec![ArtifactKind::Diagnostics, ArtifactKind::Primitives]);
    assert!(report.artifact(ArtifactKind::EnergyLedger).is_some());
    assert!(report.artifact(ArtifactKind::Solution).is_some());
}

#[test]
fn end_to_end_with_built_in_backend() {
    let (dir, problem, candidates) = workspace();
    let config = cfg(&problem).with_candidates(&candidates);
    let report = Driver::new(&config, &LineIo).solve().unwrap();
    assert_eq!(report.attempts, 1);
    assert_eq!(report.x, vec![0.0, 1.0, 1.0, 0.0]);
    assert_eq!(report.energy.total(), -3.5);

    let saved = LineIo
        .read_primitives(&dir.path().join("primitives_it5.bonmin.csv"))
        .unwrap();
    let active = saved
        .iter()
        .flatten()
        .filter(|p| p.status == Status::Active)
        .count();
    assert_eq!(active, 2);

    // A second run of the same iteration keeps the first file as a backup.
    Driver::new(&config, &LineIo).solve().unwrap();
    assert!(dir.path().join("primitives_it5.bonmin.csv.bak").exists());
    let ledger = fs::read_to_string(dir.path().join("energy.csv")).unwrap();
    assert_eq!(ledger.lines().count(), 2);
}
