//! Entry points of a Thunder program.

use thunder_core::ExportTree;
use tracing::{debug, info};

use crate::context::ThunderContext;
use crate::error::ModuleResult;

/// Run the module named after `stack_name` and export its outputs under the
/// stack name.
///
/// `thunder:provider` in the stack settings replaces `provider`, which lets a
/// stack run one of the `shared` modules.
pub fn run_stack(ctx: &ThunderContext, provider: &str, stack_name: &str) -> ModuleResult<ExportTree> {
    let provider = match ctx.env().provider_override() {
        Some(overridden) => {
            debug!("provider `{}` overridden with `{}`", provider, overridden);
            overridden
        }
        None => provider.to_string(),
    };

    let module = ctx.manager().get(&provider, stack_name)?;
    info!("running module `{}` with provider `{}`", stack_name, provider);

    let exports = module.run(ctx, stack_name, None)?;
    ctx.engine().export(stack_name, exports.clone())?;
    Ok(exports)
}

/// Run the engine's active stack.
pub fn run_active_stack(ctx: &ThunderContext, provider: &str) -> ModuleResult<ExportTree> {
    let stack = ctx.engine().stack();
    debug!("active stack is `{}`", stack);
    run_stack(ctx, provider, &stack)
}
