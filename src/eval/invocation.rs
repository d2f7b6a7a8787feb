//! Building the evaluator command line for one experiment.

use std::path::{Path, PathBuf};

use crate::experiment::{Dataset, ExperimentId};

/// Where the dataset root is mounted inside the evaluator container.
const CONTAINER_DATASET_ROOT: &str = "/app/nonrigid_dataset";

/// Where the staging directory is mounted inside the evaluator container.
const CONTAINER_EXPERIMENT_DIR: &str = "/app/experiments";

/// How the evaluator is started.
#[derive(Debug, Clone, PartialEq)]
pub enum Launcher {
    /// `docker run --rm` with the staging and dataset directories mounted.
    Docker {
        image: String,
        /// Python module run with `python3 -m`.
        module: String,
        /// Build context used when the image is missing.
        dockerfile_dir: Option<PathBuf>,
    },
    /// A host program invoked directly with host paths.
    Local { program: String, args: Vec<String> },
}

/// Everything needed to build an evaluator invocation.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub launcher: Launcher,
    /// Staging directory holding `{id}.json` / `{id}.out`.
    pub experiment_dir: PathBuf,
    /// Directory containing `test_single_obj/`, `test_multiple_obj/`, ...
    pub dataset_root: PathBuf,
    /// Worker-count hint passed as `--nproc`.
    pub nproc: u32,
}

/// A fully-resolved command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub experiment_id: ExperimentId,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The command line as one string, for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl EvaluatorConfig {
    /// Command line evaluating `id` against `dataset` / `split`.
    pub fn invocation(&self, id: &ExperimentId, dataset: Dataset, split: &str) -> Invocation {
        match &self.launcher {
            Launcher::Docker { image, module, .. } => {
                let mut args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "-v".to_string(),
                    format!("{}:{CONTAINER_DATASET_ROOT}", self.dataset_root.display()),
                    "-v".to_string(),
                    format!("{}:{CONTAINER_EXPERIMENT_DIR}/", self.experiment_dir.display()),
                    image.clone(),
                    "python3".to_string(),
                    "-m".to_string(),
                    module.clone(),
                ];
                args.extend(evaluator_args(
                    &format!("{CONTAINER_EXPERIMENT_DIR}/{}", id.input_file_name()),
                    &format!("{CONTAINER_EXPERIMENT_DIR}/{}", id.output_file_name()),
                    &format!("{CONTAINER_DATASET_ROOT}/{}/", dataset.dir_name()),
                    split,
                    self.nproc,
                ));
                Invocation {
                    experiment_id: id.clone(),
                    program: "docker".to_string(),
                    args,
                }
            }
            Launcher::Local { program, args: leading } => {
                let mut args = leading.clone();
                args.extend(evaluator_args(
                    &host_path(&self.experiment_dir, &id.input_file_name()),
                    &host_path(&self.experiment_dir, &id.output_file_name()),
                    &format!("{}/", self.dataset_root.join(dataset.dir_name()).display()),
                    split,
                    self.nproc,
                ));
                Invocation {
                    experiment_id: id.clone(),
                    program: program.clone(),
                    args,
                }
            }
        }
    }
}

fn host_path(dir: &Path, file: &str) -> String {
    dir.join(file).display().to_string()
}

/// The stable evaluator contract: input, output, dataset, split, nproc.
fn evaluator_args(
    input: &str,
    output: &str,
    dataset: &str,
    split: &str,
    nproc: u32,
) -> Vec<String> {
    vec![
        "--input".to_string(),
        input.to_string(),
        "--output".to_string(),
        output.to_string(),
        "--dataset".to_string(),
        dataset.to_string(),
        "--split".to_string(),
        split.to_string(),
        "--nproc".to_string(),
        nproc.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(launcher: Launcher) -> EvaluatorConfig {
        EvaluatorConfig {
            launcher,
            experiment_dir: PathBuf::from("/srv/experiments"),
            dataset_root: PathBuf::from("/srv/dataset"),
            nproc: 10,
        }
    }

    #[test]
    fn docker_command_line() {
        let cfg = config(Launcher::Docker {
            image: "eval_server".into(),
            module: "nonrigid_benchmark.evaluate".into(),
            dockerfile_dir: None,
        });
        let id = ExperimentId::from("abc");
        let inv = cfg.invocation(&id, Dataset::MultipleObject, "illumination-scale");

        assert_eq!(inv.program, "docker");
        assert_eq!(
            inv.display(),
            "docker run --rm \
             -v /srv/dataset:/app/nonrigid_dataset \
             -v /srv/experiments:/app/experiments/ \
             eval_server python3 -m nonrigid_benchmark.evaluate \
             --input /app/experiments/abc.json \
             --output /app/experiments/abc.out \
             --dataset /app/nonrigid_dataset/test_multiple_obj/ \
             --split illumination-scale --nproc 10"
        );
    }

    #[test]
    fn local_command_line_uses_host_paths() {
        let cfg = config(Launcher::Local {
            program: "python3".into(),
            args: vec!["-m".into(), "nonrigid_benchmark.evaluate".into()],
        });
        let id = ExperimentId::from("abc");
        let inv = cfg.invocation(&id, Dataset::Scale, "scale");

        assert_eq!(inv.program, "python3");
        assert_eq!(
            inv.args,
            vec![
                "-m",
                "nonrigid_benchmark.evaluate",
                "--input",
                "/srv/experiments/abc.json",
                "--output",
                "/srv/experiments/abc.out",
                "--dataset",
                "/srv/dataset/test_scale/",
                "--split",
                "scale",
                "--nproc",
                "10",
            ]
        );
        assert_eq!(inv.experiment_id, id);
    }

    #[test]
    fn split_is_passed_verbatim() {
        let cfg = config(Launcher::Local {
            program: "eval".into(),
            args: vec![],
        });
        let inv = cfg.invocation(
            &ExperimentId::from("x"),
            Dataset::SingleObject,
            "viewpoint-deformation_1",
        );
        let split_pos = inv.args.iter().position(|a| a == "--split").unwrap();
        assert_eq!(inv.args[split_pos + 1], "viewpoint-deformation_1");
    }
}
