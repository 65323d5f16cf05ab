//! The weaving engine. For each (method, annotation) target the rewrite
//! moves through eligibility → normalize → instrument → finalize, and is
//! atomic per method: an ineligible method is left untouched, and all
//! fallible resolution happens before the body is modified.

use tracing::debug;

use crate::config::WeaverConfig;
use crate::discovery::{self, WeaveTarget};
use crate::error::{Ineligibility, WeavingError};
use crate::il::Instruction;
use crate::module::{MethodIndex, Module};
use crate::verify;

mod context;
mod groups;
mod materialize;

use context::{ResolvedOps, RewriteContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaveOutcome {
    Woven,
    Skipped(Ineligibility),
}

/// Rewrites a single method for a single annotation. Holds no state
/// between rewrites; every call builds and discards a fresh context.
pub struct MethodWeaver<'c> {
    config: &'c WeaverConfig,
}

impl<'c> MethodWeaver<'c> {
    pub fn new(config: &'c WeaverConfig) -> Self {
        MethodWeaver { config }
    }

    pub fn weave(
        &self,
        module: &mut Module,
        target: &WeaveTarget,
    ) -> Result<WeaveOutcome, WeavingError> {
        // Eligibility: anything skipped here is left byte-identical.
        let method = &module[target.method];
        let Some(return_type) = method.signature.return_type.clone() else {
            return Ok(WeaveOutcome::Skipped(Ineligibility::VoidReturn));
        };
        if method.is_constructor() {
            return Ok(WeaveOutcome::Skipped(Ineligibility::Constructor));
        }
        let has_return = method
            .body
            .as_ref()
            .is_some_and(|body| body.iter().any(|(_, i)| i.is_return()));
        if !has_return {
            return Ok(WeaveOutcome::Skipped(Ineligibility::NoReturnPath));
        }
        let signature = method.signature.clone();

        // Resolve everything the rewrite needs before touching the body.
        let ops = ResolvedOps::resolve(module, target, &return_type)?;

        let body = module[target.method]
            .body
            .as_mut()
            .expect("eligibility established a body");

        // Normalize: canonical long encodings, zero-initialized locals.
        body.normalize();

        let ctx = RewriteContext::allocate(body, ops, target, &return_type);

        // Instrument. The original first instruction and return sites are
        // snapshotted before any generated node exists, so the generated
        // returns are never redirected.
        let first = body.first().expect("a body with a return is non-empty");
        let return_sites = body.return_sites();

        let capture = body.alloc_group(groups::capture_return_value(&ctx));
        let store = body.alloc_group(groups::call_store(&ctx));
        let exit = body.alloc_group(groups::epilogue(&ctx));
        let epilogue_entry = capture[0];

        // Every original return becomes a jump to the shared epilogue;
        // this is also what makes returns inside protected regions legal
        // to redirect, since the epilogue sits outside every region.
        for site in return_sites {
            body.replace(site, Instruction::Branch(epilogue_entry));
        }

        let prologue = [
            materialize::annotation_instance(&ctx),
            groups::build_argument_array(&signature, &ctx),
            groups::call_retrieve(&ctx),
            groups::early_return_if_present(&ctx, &return_type, first),
        ];
        for group in prologue {
            let ids = body.alloc_group(group);
            body.insert_before(first, &ids);
        }

        body.append(&capture);
        body.append(&store);
        body.append(&exit);

        // Finalize: compact encodings, then verify and record max-stack.
        body.compact();

        if self.config.verify {
            let method = &module[target.method];
            let body = method.body.as_ref().expect("body still present");
            let max_stack = verify::verify(module, body, &method.signature)?;
            module[target.method]
                .body
                .as_mut()
                .expect("body still present")
                .max_stack = max_stack;
        }

        debug!(method = %module.method_full_name(target.method), "rewrote cached method");
        Ok(WeaveOutcome::Woven)
    }
}

#[derive(Debug, Default)]
pub struct WeaveReport {
    pub woven: usize,
    pub skipped: Vec<(MethodIndex, Ineligibility)>,
}

/// The module-level pass: discover targets, weave each in declaration
/// order, abort the whole pass on the first failure. A module with no
/// marker type weaves nothing and succeeds.
pub struct ModuleWeaver<'c> {
    config: &'c WeaverConfig,
}

impl<'c> ModuleWeaver<'c> {
    pub fn new(config: &'c WeaverConfig) -> Self {
        ModuleWeaver { config }
    }

    pub fn execute(&self, module: &mut Module) -> Result<WeaveReport, WeavingError> {
        let Some(marker) = module.find_type(self.config.marker()) else {
            debug!(marker = self.config.marker(), "marker type absent, nothing to weave");
            return Ok(WeaveReport::default());
        };

        let targets =
            discovery::annotated_methods(module, marker, self.config.duplicate_annotations)?;
        let weaver = MethodWeaver::new(self.config);

        let mut report = WeaveReport::default();
        for target in targets {
            match weaver.weave(module, &target)? {
                WeaveOutcome::Woven => report.woven += 1,
                WeaveOutcome::Skipped(reason) => {
                    debug!(
                        method = %module.method_full_name(target.method),
                        %reason,
                        "skipping ineligible method"
                    );
                    report.skipped.push((target.method, reason));
                }
            }
        }
        Ok(report)
    }
}
