//! Async cook passes
//!
//! A cook pass reads every output on the main thread, converts the tiles on Bevy's
//! AsyncComputeTaskPool and commits them back through the translator once all of them
//! are done. Only one pass runs at a time; requests made meanwhile wait in a queue.

use crate::config::MarshallingConfig;
use crate::error::{LandscapeError, Result};
use crate::host::{LandscapeHost, LandscapeId};
use crate::registry::LandscapeRegistry;
use crate::source::GeometrySource;
use crate::translator::{
    ConvertedTile, LandscapeOutput, LandscapeTranslator, OutputId, calc_height_global_z_min_max,
};
use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task, block_on};
use std::collections::{HashMap, HashSet, VecDeque};

/// Geometry source the cook systems read from
#[derive(Resource)]
pub struct LandscapeSource(pub Box<dyn GeometrySource + Send + Sync>);

/// Outputs to cook together, sharing one height range
#[derive(Clone, Debug, Default)]
pub struct CookRequest {
    pub outputs: Vec<LandscapeOutput>,
    /// Landscapes supplied as inputs that may be updated in place
    pub inputs_to_update: Vec<LandscapeId>,
    /// Landscapes that must never be reused as previous output nor destroyed
    pub valid_landscapes: Vec<LandscapeId>,
}

/// A cook pass in progress
pub struct CookPass {
    order: Vec<OutputId>,
    in_flight: HashMap<OutputId, Task<Result<ConvertedTile>>>,
    finished: HashMap<OutputId, Result<ConvertedTile>>,
    inputs_to_update: Vec<LandscapeId>,
    valid_landscapes: Vec<LandscapeId>,
}

impl CookPass {
    /// Read every output and spawn its conversion.
    ///
    /// Outputs that were bound before but are missing from the request are released
    /// first. Tiles that cannot be read finish immediately with their error.
    pub fn start(
        request: CookRequest,
        source: &dyn GeometrySource,
        translator: &mut LandscapeTranslator,
        host: &mut dyn LandscapeHost,
    ) -> Self {
        let present: HashSet<OutputId> = request.outputs.iter().map(|output| output.id).collect();
        for id in translator.bound_outputs().into_iter().filter(|id| !present.contains(id)) {
            translator.release_output(host, id);
        }

        let task_pool = AsyncComputeTaskPool::get();
        let global_range = calc_height_global_z_min_max(source, &request.outputs);
        let mut pass = Self {
            order: Vec::with_capacity(request.outputs.len()),
            in_flight: HashMap::new(),
            finished: HashMap::new(),
            inputs_to_update: request.inputs_to_update,
            valid_landscapes: request.valid_landscapes,
        };

        for output in &request.outputs {
            pass.order.push(output.id);
            match translator.prepare_tile(source, output, global_range) {
                Ok(prepared) => {
                    let config: MarshallingConfig = translator.config.clone();
                    let task = task_pool.spawn(async move { LandscapeTranslator::convert_tile(prepared, &config) });
                    pass.in_flight.insert(output.id, task);
                }
                Err(err) => {
                    pass.finished.insert(output.id, Err(err));
                }
            }
        }
        debug!(
            "Started landscape cook of {} outputs, {} converting",
            pass.order.len(),
            pass.in_flight.len()
        );
        pass
    }

    /// Collect finished conversions. True once nothing is left in flight.
    pub fn poll(&mut self) -> bool {
        let finished_ids: Vec<OutputId> = self
            .in_flight
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for id in finished_ids {
            if let Some(mut task) = self.in_flight.remove(&id)
                && let Some(result) = block_on(futures_lite::future::poll_once(&mut task))
            {
                self.finished.insert(id, result);
            }
        }
        self.in_flight.is_empty()
    }

    /// Commit every converted tile in request order.
    pub fn commit(
        mut self,
        translator: &mut LandscapeTranslator,
        host: &mut dyn LandscapeHost,
    ) -> Vec<(OutputId, Result<LandscapeId>)> {
        let mut results = Vec::with_capacity(self.order.len());
        for id in std::mem::take(&mut self.order) {
            let result = match self.finished.remove(&id) {
                Some(Ok(tile)) => {
                    translator.commit_tile(host, tile, &mut self.inputs_to_update, &self.valid_landscapes)
                }
                Some(Err(err)) => Err(err),
                None => Err(LandscapeError::InvalidInput(format!(
                    "output {} was never converted",
                    id.0
                ))),
            };
            if let Err(err) = &result {
                error!("Landscape output {} failed: {err}", id.0);
            }
            results.push((id, result));
        }
        results
    }
}

/// Resource driving cook passes
#[derive(Resource, Default)]
pub struct LandscapeCook {
    pending: VecDeque<CookRequest>,
    active: Option<CookPass>,
    /// Results of the last finished pass
    pub last_results: Vec<(OutputId, Result<LandscapeId>)>,
    /// Number of passes finished so far
    pub passes: u32,
}

impl LandscapeCook {
    pub fn request(&mut self, request: CookRequest) {
        self.pending.push_back(request);
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_none()
    }
}

/// System: start the next queued pass when none is running
pub fn start_cook_pass(
    source: Option<Res<LandscapeSource>>,
    mut cook: ResMut<LandscapeCook>,
    mut translator: ResMut<LandscapeTranslator>,
    mut registry: ResMut<LandscapeRegistry>,
) {
    if cook.active.is_some() {
        return;
    }
    let Some(source) = source else {
        return;
    };
    let Some(request) = cook.pending.pop_front() else {
        return;
    };

    let pass = CookPass::start(request, source.0.as_ref(), &mut *translator, &mut *registry);
    cook.active = Some(pass);
}

/// System: poll conversions and commit the pass once all are done
pub fn finish_cook_pass(
    mut cook: ResMut<LandscapeCook>,
    mut translator: ResMut<LandscapeTranslator>,
    mut registry: ResMut<LandscapeRegistry>,
) {
    let done = match cook.active.as_mut() {
        Some(pass) => pass.poll(),
        None => return,
    };
    if !done {
        return;
    }

    if let Some(pass) = cook.active.take() {
        let results = pass.commit(&mut *translator, &mut *registry);
        let succeeded = results.iter().filter(|(_, result)| result.is_ok()).count();
        info!("Landscape cook finished: {succeeded}/{} outputs", results.len());
        cook.last_results = results;
        cook.passes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageParams;
    use crate::source::{MemorySource, PartKey, VolumeInfo};
    use bevy::tasks::TaskPool;
    use std::time::Duration;

    fn output(source: &mut MemorySource, id: u32, geo: i32) -> LandscapeOutput {
        let samples = (0..64).map(|i| i as f32).collect();
        let part = source.add_volume(PartKey::new(1, geo, 0), VolumeInfo::heightfield("height", 8, 8), samples);
        LandscapeOutput::new(OutputId(id), vec![part])
    }

    fn run_pass(
        request: CookRequest,
        source: &MemorySource,
        translator: &mut LandscapeTranslator,
        registry: &mut LandscapeRegistry,
    ) -> Vec<(OutputId, Result<LandscapeId>)> {
        AsyncComputeTaskPool::get_or_init(TaskPool::new);
        let mut pass = CookPass::start(request, source, translator, registry);
        let mut attempts = 0;
        while !pass.poll() {
            attempts += 1;
            assert!(attempts < 10_000, "conversion never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
        pass.commit(translator, registry)
    }

    #[test]
    fn test_pass_commits_in_request_order() {
        let mut source = MemorySource::new();
        let outputs = vec![output(&mut source, 2, 8), output(&mut source, 1, 7)];
        let mut translator =
            LandscapeTranslator::with_seed(MarshallingConfig::default(), PackageParams::new("terrain"), 1);
        let mut registry = LandscapeRegistry::default();

        let request = CookRequest {
            outputs,
            ..Default::default()
        };
        let results = run_pass(request, &source, &mut translator, &mut registry);
        let ids: Vec<OutputId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![OutputId(2), OutputId(1)]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unreadable_output_fails_alone() {
        let mut source = MemorySource::new();
        let good = output(&mut source, 1, 7);
        let empty = LandscapeOutput::new(OutputId(2), Vec::new());
        let mut translator =
            LandscapeTranslator::with_seed(MarshallingConfig::default(), PackageParams::new("terrain"), 1);
        let mut registry = LandscapeRegistry::default();

        let request = CookRequest {
            outputs: vec![good, empty],
            ..Default::default()
        };
        let results = run_pass(request, &source, &mut translator, &mut registry);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1.as_ref().unwrap_err().reason(), "not_found");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_pass_releases_missing_outputs() {
        let mut source = MemorySource::new();
        let a = output(&mut source, 1, 7);
        let b = output(&mut source, 2, 8);
        let mut translator =
            LandscapeTranslator::with_seed(MarshallingConfig::default(), PackageParams::new("terrain"), 1);
        let mut registry = LandscapeRegistry::default();

        let both = CookRequest {
            outputs: vec![a.clone(), b],
            ..Default::default()
        };
        run_pass(both, &source, &mut translator, &mut registry);
        let only_a = CookRequest {
            outputs: vec![a],
            ..Default::default()
        };
        run_pass(only_a, &source, &mut translator, &mut registry);
        assert_eq!(registry.len(), 1);
        assert!(translator.bindings(OutputId(2)).is_none());
    }

    #[test]
    fn test_requests_queue_until_idle() {
        let mut cook = LandscapeCook::default();
        assert!(cook.is_idle());
        cook.request(CookRequest::default());
        assert!(!cook.is_idle());
    }
}
