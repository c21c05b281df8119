//! The pass framework: registry, analysis cache, and the fixed-point
//! driver.
//!
//! Passes are described by [`PassInfo`] records — name, kind
//! (module/function/block), minimum optimization level, pipeline stage,
//! and the names of the analysis passes they require — and registered
//! explicitly through [`register_all_passes`] (no global constructors, so
//! registration order is the pass order and nothing depends on
//! initialization luck).
//!
//! [`PassManager::run_passes`] runs `PreOpt` passes once, then sweeps the
//! `Opt` passes until a full sweep reports no change, then runs `PostOpt`
//! once. Analysis passes recompute their stores on every sweep and always
//! report "no change"; transform passes read them from the
//! [`AnalysisCache`] by name. The fixed point is bounded: a module with N
//! instructions gets at most `2 + N` sweeps before the driver gives up and
//! keeps the last IR.

pub mod const_fold;
pub mod dce;
pub mod dom_info;
pub mod licm;
pub mod loop_info;
pub mod loop_norm;
pub mod loop_reduce;

use std::any::Any;
use std::io::{self, Write};

use hashbrown::HashMap;

use crate::ir::{Module, Value};

/// Granularity a pass runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Module,
    Function,
    Block,
}

/// Pipeline stage a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    /// Runs once, before the optimization fixed point.
    PreOpt,
    /// Runs in every sweep of the fixed point.
    Opt,
    /// Runs once, after the fixed point converged.
    PostOpt,
}

/// Typed, name-keyed storage for analysis results. Analysis passes write
/// their stores here; transform passes fetch them with
/// [`AnalysisCache::get`] (the lookup-by-name contract of the framework).
#[derive(Default)]
pub struct AnalysisCache {
    entries: HashMap<&'static str, Box<dyn Any>>,
}

impl AnalysisCache {
    pub fn put<T: Any>(&mut self, name: &'static str, value: T) {
        self.entries.insert(name, Box::new(value));
    }

    /// Fetch the result store of the analysis pass `name`. Panics when the
    /// pass has not run or `T` is the wrong type — both are registration
    /// bugs, not runtime conditions.
    pub fn get<T: Any>(&self, name: &str) -> &T {
        self.entries
            .get(name)
            .and_then(|e| e.downcast_ref())
            .unwrap_or_else(|| panic!("analysis '{}' not computed", name))
    }

    pub fn get_mut<T: Any>(&mut self, name: &str) -> &mut T {
        self.entries
            .get_mut(name)
            .and_then(|e| e.downcast_mut())
            .unwrap_or_else(|| panic!("analysis '{}' not computed", name))
    }

    pub fn get_or_default<T: Any + Default>(&mut self, name: &'static str) -> &mut T {
        self.entries
            .entry(name)
            .or_insert_with(|| Box::<T>::default())
            .downcast_mut()
            .unwrap_or_else(|| panic!("analysis '{}' has the wrong type", name))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A pass instance. Only the entry point matching the registered
/// [`PassKind`] is invoked; the others keep their no-op defaults.
pub trait Pass {
    fn run_on_module(&mut self, m: &mut Module, cache: &mut AnalysisCache) -> bool {
        let _ = (m, cache);
        false
    }

    fn run_on_function(&mut self, m: &mut Module, func: Value, cache: &mut AnalysisCache) -> bool {
        let _ = (m, func, cache);
        false
    }

    fn run_on_block(&mut self, m: &mut Module, block: Value, cache: &mut AnalysisCache) -> bool {
        let _ = (m, block, cache);
        false
    }
}

/// Static description of a pass.
pub struct PassInfo {
    pub name: &'static str,
    pub kind: PassKind,
    pub stage: PassStage,
    pub min_opt_level: u32,
    /// Names of analysis passes that must be registered (and thus run)
    /// before this one.
    pub requires: &'static [&'static str],
    pub factory: fn() -> Box<dyn Pass>,
}

/// Registry and fixed-point driver.
pub struct PassManager {
    opt_level: u32,
    passes: Vec<(PassInfo, Box<dyn Pass>)>,
    cache: AnalysisCache,
}

impl PassManager {
    pub fn new(opt_level: u32) -> Self {
        PassManager { opt_level, passes: Vec::new(), cache: AnalysisCache::default() }
    }

    pub fn opt_level(&self) -> u32 {
        self.opt_level
    }

    /// Register a pass. Required analyses must have been registered first;
    /// registration order is execution order.
    pub fn register(&mut self, info: PassInfo) {
        for req in info.requires {
            assert!(
                self.passes.iter().any(|(i, _)| i.name == *req),
                "pass '{}' requires '{}' which is not registered",
                info.name,
                req
            );
        }
        let pass = (info.factory)();
        self.passes.push((info, pass));
    }

    /// Run the registered pipeline to its fixed point.
    pub(crate) fn run(&mut self, m: &mut Module) {
        self.run_stage(m, PassStage::PreOpt);

        // One transformation per instruction is the natural ceiling; the
        // slack covers analysis-only sweeps.
        let bound = 2 + m.inst_count();
        let mut sweeps = 0usize;
        loop {
            let changed = self.run_stage(m, PassStage::Opt);
            sweeps += 1;
            log::debug!("pass sweep {} {}", sweeps, if changed { "changed" } else { "converged" });
            if !changed {
                break;
            }
            if sweeps >= bound {
                log::warn!("optimization did not converge after {} sweeps, keeping last IR", sweeps);
                break;
            }
        }

        self.run_stage(m, PassStage::PostOpt);
    }

    fn run_stage(&mut self, m: &mut Module, stage: PassStage) -> bool {
        let PassManager { opt_level, passes, cache } = self;
        let mut changed = false;
        for (info, pass) in passes.iter_mut() {
            if info.stage != stage || info.min_opt_level > *opt_level {
                continue;
            }
            let pass_changed = match info.kind {
                PassKind::Module => pass.run_on_module(m, cache),
                PassKind::Function => {
                    let mut any = false;
                    for func in m.funcs().to_vec() {
                        if pass.run_on_function(m, func, cache) {
                            any = true;
                        }
                    }
                    any
                }
                PassKind::Block => {
                    let mut any = false;
                    for func in m.funcs().to_vec() {
                        for block in m.graph.operands(func) {
                            if pass.run_on_block(m, block, cache) {
                                any = true;
                            }
                        }
                    }
                    any
                }
            };
            if pass_changed {
                log::debug!("pass '{}' changed the IR", info.name);
                changed = true;
            }
        }
        changed
    }

    /// Print the registered and enabled passes.
    pub fn show_info<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "current optimization level: {}", self.opt_level)?;
        writeln!(w)?;
        writeln!(w, "registered passes:")?;
        if self.passes.is_empty() {
            writeln!(w, "  <none>")?;
            return Ok(());
        }
        for (info, _) in &self.passes {
            writeln!(w, "  {:<20}min_opt_level = {}", info.name, info.min_opt_level)?;
        }
        writeln!(w)?;
        writeln!(w, "enabled passes:")?;
        let enabled: Vec<_> = self
            .passes
            .iter()
            .filter(|(i, _)| i.min_opt_level <= self.opt_level)
            .map(|(i, _)| i.name)
            .collect();
        if enabled.is_empty() {
            writeln!(w, "  <none>")?;
        } else {
            writeln!(w, "  {}", enabled.join(", "))?;
        }
        Ok(())
    }
}

/// Register the whole pipeline in dependency order.
pub fn register_all_passes(pm: &mut PassManager) {
    pm.register(dom_info::INFO);
    pm.register(loop_info::INFO);
    pm.register(loop_norm::INFO);
    pm.register(loop_reduce::INFO);
    pm.register(licm::INFO);
    pm.register(const_fold::INFO);
    pm.register(dce::INFO);
}

impl Module {
    /// Seal the global constructor and run the manager's pipeline.
    pub fn run_passes(&mut self, pm: &mut PassManager) {
        self.seal_global_ctor();
        pm.run(self);
    }
}
