/// Declarative stage graph executed on the rayon worker pool
///
/// Marking stages declare their predecessors up front; the graph levels
/// itself topologically and runs every ready stage in parallel, fanning
/// indexed stages out across the pool. Stages run to completion once
/// dispatched; there is no cancellation. Malformed graphs (unknown
/// dependencies, cycles) are programming errors and abort.
use rayon::prelude::*;

pub type StageId = usize;

enum Work<'scope> {
    Run(Box<dyn FnOnce() + Send + 'scope>),
    RunIndexed {
        count: usize,
        run: Box<dyn Fn(usize) + Send + Sync + 'scope>,
    },
}

struct Stage<'scope> {
    work: Work<'scope>,
    deps: Vec<StageId>,
}

#[derive(Default)]
pub struct StageGraph<'scope> {
    stages: Vec<Stage<'scope>>,
}

impl<'scope> StageGraph<'scope> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Declare a run-once stage. It starts only after every stage in
    /// `deps` has completed.
    pub fn stage(&mut self, deps: &[StageId], run: impl FnOnce() + Send + 'scope) -> StageId {
        self.push(Work::Run(Box::new(run)), deps)
    }

    /// Declare a data-parallel stage: `run` is invoked for every index in
    /// `0..count`, distributed over the worker pool. The stage completes
    /// when every index has run.
    pub fn stage_indexed(
        &mut self,
        deps: &[StageId],
        count: usize,
        run: impl Fn(usize) + Send + Sync + 'scope,
    ) -> StageId {
        self.push(
            Work::RunIndexed {
                count,
                run: Box::new(run),
            },
            deps,
        )
    }

    fn push(&mut self, work: Work<'scope>, deps: &[StageId]) -> StageId {
        for &dep in deps {
            assert!(
                dep < self.stages.len(),
                "stage depends on an undeclared stage"
            );
        }
        self.stages.push(Stage {
            work,
            deps: deps.to_vec(),
        });
        self.stages.len() - 1
    }

    /// Execute the graph and block until every stage has completed.
    pub fn run(self) {
        let num_stages = self.stages.len();
        let mut dependents: Vec<Vec<StageId>> = vec![Vec::new(); num_stages];
        let mut indegree = vec![0usize; num_stages];
        for (id, stage) in self.stages.iter().enumerate() {
            indegree[id] = stage.deps.len();
            for &dep in &stage.deps {
                dependents[dep].push(id);
            }
        }

        let mut pending: Vec<Option<Work<'scope>>> =
            self.stages.into_iter().map(|s| Some(s.work)).collect();
        let mut ready: Vec<StageId> = (0..num_stages).filter(|&id| indegree[id] == 0).collect();
        let mut completed = 0usize;

        while !ready.is_empty() {
            let level: Vec<Work<'scope>> = ready
                .iter()
                .map(|&id| match pending[id].take() {
                    Some(work) => work,
                    None => unreachable!("stage scheduled twice"),
                })
                .collect();

            // Independent stages of one level run concurrently; indexed
            // stages additionally fan out over the pool.
            rayon::scope(|scope| {
                for work in level {
                    match work {
                        Work::Run(run) => {
                            scope.spawn(move |_| run());
                        }
                        Work::RunIndexed { count, run } => {
                            scope.spawn(move |_| {
                                (0..count).into_par_iter().for_each(|index| run(index));
                            });
                        }
                    }
                }
            });

            completed += ready.len();
            let finished = std::mem::take(&mut ready);
            for id in finished {
                for &dependent in &dependents[id] {
                    indegree[dependent] -= 1;
                    if indegree[dependent] == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }

        assert_eq!(completed, num_stages, "stage graph contains a cycle");
    }
}
