#![allow(dead_code)]

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

use dagsim::dag::Dag;
use dagsim::dag::loader::{StageSpec, build_dag};

/// Builder for one stage object of the DAG document.
pub struct StageBuilder {
    id: usize,
    deps: Vec<usize>,
    partitions: usize,
    avg: f64,
    shuffle_avg: Option<f64>,
    input: Option<Value>,
    output: Option<Value>,
}

impl StageBuilder {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            deps: vec![],
            partitions: 1,
            avg: 1.0,
            shuffle_avg: None,
            input: None,
            output: None,
        }
    }

    pub fn dep(mut self, dep: usize) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn avg(mut self, avg: f64) -> Self {
        self.avg = avg;
        self
    }

    pub fn shuffle_avg(mut self, avg: f64) -> Self {
        self.shuffle_avg = Some(avg);
        self
    }

    pub fn input(mut self, desc: Value) -> Self {
        self.input = Some(desc);
        self
    }

    pub fn output(mut self, desc: Value) -> Self {
        self.output = Some(desc);
        self
    }

    pub fn build(self) -> Value {
        let mut stats = json!({ "avg": self.avg });
        if let Some(shuffle) = self.shuffle_avg {
            stats["shuffle"] = json!({ "avg": shuffle });
        }
        let mut stage = json!({
            "id": self.id,
            "deps": self.deps,
            "status": "pending",
            "partitions": self.partitions,
            "stats": stats,
        });
        if let Some(input) = self.input {
            stage["input"] = input;
        }
        if let Some(output) = self.output {
            stage["output"] = output;
        }
        stage
    }
}

/// Builder for a whole DAG document.
pub struct DagBuilder {
    stages: Vec<Value>,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn stage(mut self, stage: StageBuilder) -> Self {
        self.stages.push(stage.build());
        self
    }

    /// The raw JSON document, as it would live on disk.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&Value::Array(self.stages.clone())).unwrap()
    }

    /// Parse + validate the document into a live `Dag` with a fixed seed.
    pub fn build(self) -> Dag {
        self.build_seeded(42)
    }

    pub fn build_seeded(self, seed: u64) -> Dag {
        let specs: Vec<StageSpec> =
            serde_json::from_str(&self.to_json()).expect("builder produced invalid JSON");
        let mut rng = StdRng::seed_from_u64(seed);
        build_dag(specs, &mut rng).expect("builder produced an invalid DAG")
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A linear chain of `stages` stages with `partitions` tasks each; every
/// non-root stage depends on its predecessor.
pub fn linear_dag(stages: usize, partitions: usize, avg: f64, shuffle_avg: f64) -> Dag {
    let mut builder = DagBuilder::new();
    for id in 0..stages {
        let mut stage = StageBuilder::new(id).partitions(partitions).avg(avg);
        if id > 0 {
            stage = stage.dep(id - 1).shuffle_avg(shuffle_avg);
        }
        builder = builder.stage(stage);
    }
    builder.build()
}
