//! OpenVLA adapter tests
//!
//! Drive `OpenVlaModel` over a recording runtime to verify what the adapter
//! sends to the network layer and how it reports failures.

use std::sync::{Arc, Mutex};
use vla_infer_core::image::placeholder;
use vla_infer_core::{Error, Result, RgbImage};
use vla_infer_models::{
    AttnImplementation, DeviceKind, DeviceProbe, LoadOptions, LoadSettings, OpenVlaModel,
    Precision, PredictOptions, Sampling, VlaModel, VlaRuntime, VlaSession,
};

/// Everything the runtime observed
#[derive(Debug, Default)]
struct Calls {
    loads: Vec<(String, DeviceKind, LoadSettings)>,
    prompts: Vec<String>,
    predictions: Vec<(String, Sampling)>,
}

/// Runtime that records calls and returns a canned action
#[derive(Clone)]
struct RecordingRuntime {
    calls: Arc<Mutex<Calls>>,
    action: Vec<f32>,
    fail_load: Option<String>,
}

impl RecordingRuntime {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            action: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 1.0],
            fail_load: None,
        }
    }

    fn with_action(mut self, action: Vec<f32>) -> Self {
        self.action = action;
        self
    }

    fn failing_load(mut self, message: &str) -> Self {
        self.fail_load = Some(message.to_string());
        self
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

struct RecordingSession {
    calls: Arc<Mutex<Calls>>,
    action: Vec<f32>,
}

impl VlaRuntime for RecordingRuntime {
    type Session = RecordingSession;

    fn load(&self, model_id: &str, device: DeviceKind, settings: &LoadSettings) -> Result<RecordingSession> {
        self.calls
            .lock()
            .unwrap()
            .loads
            .push((model_id.to_string(), device, settings.clone()));

        if let Some(message) = &self.fail_load {
            return Err(Error::config(message.clone()));
        }

        Ok(RecordingSession {
            calls: self.calls.clone(),
            action: self.action.clone(),
        })
    }
}

impl VlaSession for RecordingSession {
    type Inputs = String;

    fn encode(&self, prompt: &str, _image: &RgbImage) -> Result<String> {
        self.calls.lock().unwrap().prompts.push(prompt.to_string());
        Ok(prompt.to_string())
    }

    fn predict_action(&self, _inputs: String, unnorm_key: &str, sampling: Sampling) -> Result<Vec<f32>> {
        self.calls
            .lock()
            .unwrap()
            .predictions
            .push((unnorm_key.to_string(), sampling));
        Ok(self.action.clone())
    }
}

struct FixedProbe {
    cuda: bool,
    metal: bool,
}

impl DeviceProbe for FixedProbe {
    fn cuda_available(&self) -> bool {
        self.cuda
    }

    fn metal_available(&self) -> bool {
        self.metal
    }
}

fn cpu_only() -> FixedProbe {
    FixedProbe {
        cuda: false,
        metal: false,
    }
}

#[test]
fn test_predict_before_load_never_reaches_runtime() {
    let runtime = RecordingRuntime::new();
    let model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(cpu_only());

    let err = model
        .predict(&placeholder(), "pick up the cup", &PredictOptions::default())
        .unwrap_err();

    assert!(matches!(err, Error::NotLoaded));
    assert!(runtime.calls().loads.is_empty());
    assert!(runtime.calls().prompts.is_empty());
}

#[test]
fn test_load_uses_device_defaults() {
    let runtime = RecordingRuntime::new();
    let mut model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(cpu_only());

    model.load("openvla/openvla-7b", &LoadOptions::default()).unwrap();

    assert!(model.is_loaded());
    assert_eq!(model.device(), Some(DeviceKind::Cpu));
    assert_eq!(model.model_id(), Some("openvla/openvla-7b"));

    let calls = runtime.calls();
    let (id, device, settings) = &calls.loads[0];
    assert_eq!(id, "openvla/openvla-7b");
    assert_eq!(*device, DeviceKind::Cpu);
    assert!(settings.trust_remote_code);
    assert!(settings.low_cpu_mem_usage);
    assert_eq!(settings.dtype, Precision::F32);
    assert_eq!(settings.attn_implementation, AttnImplementation::Eager);
    assert_eq!(settings.revision, "main");
}

#[test]
fn test_probe_prefers_cuda_then_metal() {
    let runtime = RecordingRuntime::new();
    let mut model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(FixedProbe {
        cuda: true,
        metal: true,
    });
    model.load("m", &LoadOptions::default()).unwrap();
    assert_eq!(model.device(), Some(DeviceKind::Cuda));
    assert_eq!(runtime.calls().loads[0].2.dtype, Precision::Bf16);

    let runtime = RecordingRuntime::new();
    let mut model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(FixedProbe {
        cuda: false,
        metal: true,
    });
    model.load("m", &LoadOptions::default()).unwrap();
    assert_eq!(model.device(), Some(DeviceKind::Mps));
    assert_eq!(runtime.calls().loads[0].2.dtype, Precision::F16);
}

#[test]
fn test_caller_options_override_defaults() {
    let runtime = RecordingRuntime::new();
    let mut model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(FixedProbe {
        cuda: true,
        metal: false,
    });

    let options = LoadOptions::new()
        .with_device(DeviceKind::Cpu)
        .with_dtype(Precision::Bf16)
        .with_low_cpu_mem_usage(false)
        .with_revision("v1");
    model.load("local/ckpt", &options).unwrap();

    let calls = runtime.calls();
    let (_, device, settings) = &calls.loads[0];
    assert_eq!(*device, DeviceKind::Cpu);
    assert_eq!(settings.dtype, Precision::Bf16);
    assert!(!settings.low_cpu_mem_usage);
    assert!(settings.trust_remote_code);
    assert_eq!(settings.revision, "v1");
}

#[test]
fn test_load_failure_is_reported_as_load_error() {
    let runtime = RecordingRuntime::new().failing_load("config.json is missing");
    let mut model = OpenVlaModel::with_runtime(runtime).with_probe(cpu_only());

    let err = model.load("broken", &LoadOptions::default()).unwrap_err();
    match err {
        Error::Load(message) => assert!(message.contains("config.json is missing")),
        other => panic!("expected Load error, got {:?}", other),
    }
    assert!(!model.is_loaded());
}

#[test]
fn test_predict_sends_lowercased_prompt_and_defaults() {
    let runtime = RecordingRuntime::new();
    let mut model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(cpu_only());
    model.load("m", &LoadOptions::default()).unwrap();

    let result = model
        .predict(&placeholder(), "Pick up the RED Block", &PredictOptions::default())
        .unwrap();

    assert_eq!(result.position(), [0.1, 0.2, 0.3]);
    assert_eq!(result.gripper(), 1.0);
    assert!(result.description().is_none());

    let calls = runtime.calls();
    assert_eq!(
        calls.prompts,
        vec!["In: What action should the robot take to pick up the red block?\nOut:".to_string()]
    );
    assert_eq!(calls.predictions, vec![("bridge_orig".to_string(), Sampling::Greedy)]);
}

#[test]
fn test_predict_options_reach_runtime() {
    let runtime = RecordingRuntime::new();
    let mut model = OpenVlaModel::with_runtime(runtime.clone()).with_probe(cpu_only());
    model.load("m", &LoadOptions::default()).unwrap();

    let options = PredictOptions::new()
        .with_unnorm_key("fractal20220817_data")
        .with_do_sample(true)
        .with_seed(7);
    model.predict(&placeholder(), "wipe the table", &options).unwrap();

    assert_eq!(
        runtime.calls().predictions,
        vec![("fractal20220817_data".to_string(), Sampling::Random { seed: 7 })]
    );
}

#[test]
fn test_short_action_vector_is_an_inference_error() {
    let runtime = RecordingRuntime::new().with_action(vec![0.0; 3]);
    let mut model = OpenVlaModel::with_runtime(runtime).with_probe(cpu_only());
    model.load("m", &LoadOptions::default()).unwrap();

    let err = model
        .predict(&placeholder(), "open the drawer", &PredictOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}
