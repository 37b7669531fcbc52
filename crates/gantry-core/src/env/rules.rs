use crate::config::{RuntimeKind, SyncPrimitive};
use crate::platform::HostOs;
use crate::runtime::strategy_for;

use super::{EnvDraft, RuleContext};

/// One predicate/mutation pair. Rules run in table order.
pub struct EnvRule {
    pub name: &'static str,
    pub applies: fn(&RuleContext<'_>) -> bool,
    pub apply: fn(&RuleContext<'_>, &mut EnvDraft<'_>),
}

pub const RULES: &[EnvRule] = &[
    EnvRule {
        name: "runtime",
        applies: always,
        apply: runtime_contribution,
    },
    EnvRule {
        name: "sync-primitives",
        applies: non_native,
        apply: sync_primitives,
    },
    EnvRule {
        name: "hud",
        applies: hud_requested,
        apply: hud,
    },
    EnvRule {
        name: "frame-limit",
        applies: frame_limit_requested,
        apply: frame_limit,
    },
    EnvRule {
        name: "fsr",
        applies: fsr_requested,
        apply: fsr,
    },
    EnvRule {
        name: "gpu-offload",
        applies: prime_offload_requested,
        apply: gpu_offload,
    },
    EnvRule {
        name: "emulation",
        applies: advertise_avx_requested,
        apply: emulation_flags,
    },
    EnvRule {
        name: "verbose-logs",
        applies: verbose_requested,
        apply: verbose_diagnostics,
    },
];

fn always(_ctx: &RuleContext<'_>) -> bool {
    true
}

fn non_native(ctx: &RuleContext<'_>) -> bool {
    !ctx.is_native()
}

fn hud_requested(ctx: &RuleContext<'_>) -> bool {
    ctx.settings.features.show_fps && !ctx.is_native()
}

fn frame_limit_requested(ctx: &RuleContext<'_>) -> bool {
    ctx.settings.features.frame_limit.is_some_and(|fps| fps > 0)
}

fn fsr_requested(ctx: &RuleContext<'_>) -> bool {
    ctx.settings.features.fsr && !ctx.is_native()
}

fn prime_offload_requested(ctx: &RuleContext<'_>) -> bool {
    ctx.settings.features.prime_offload
}

fn advertise_avx_requested(ctx: &RuleContext<'_>) -> bool {
    ctx.settings.features.advertise_avx && !ctx.is_native()
}

fn verbose_requested(ctx: &RuleContext<'_>) -> bool {
    ctx.settings.features.verbose_logs && !ctx.is_native()
}

fn runtime_contribution(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    strategy_for(ctx.runtime.kind).env_contribution(ctx, draft);
}

fn sync_primitives(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    let requested = ctx.settings.features.sync_primitive;

    if ctx.runtime.is_proton() {
        // Proton enables both by default and only understands opt-outs.
        match requested {
            SyncPrimitive::None => {
                draft.set("PROTON_NO_ESYNC", "1");
                draft.set("PROTON_NO_FSYNC", "1");
            }
            SyncPrimitive::Esync => draft.set("PROTON_NO_FSYNC", "1"),
            SyncPrimitive::Fsync => draft.set("PROTON_NO_ESYNC", "1"),
            SyncPrimitive::Msync => {
                draft.set("PROTON_NO_ESYNC", "1");
                draft.set("PROTON_NO_FSYNC", "1");
                draft.warn("sync-primitives", "msync is not available for proton runtimes");
            }
        }
        return;
    }

    let key = match (ctx.os, requested) {
        (_, SyncPrimitive::None) => return,
        (HostOs::Linux | HostOs::MacOs, SyncPrimitive::Esync) => "WINEESYNC",
        (HostOs::Linux, SyncPrimitive::Fsync) => "WINEFSYNC",
        (HostOs::MacOs, SyncPrimitive::Msync) => "WINEMSYNC",
        (os, primitive) => {
            draft.warn(
                "sync-primitives",
                format!(
                    "{primitive:?} is not supported for {} on {}",
                    ctx.runtime.kind.as_str(),
                    os.as_str()
                ),
            );
            return;
        }
    };
    draft.set(key, "1");
}

fn hud(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    match ctx.os {
        HostOs::Linux => draft.set("DXVK_HUD", "fps"),
        HostOs::MacOs => draft.set("MTL_HUD_ENABLED", "1"),
        HostOs::Windows => draft.warn("hud", "fps HUD is not supported on windows"),
    }
}

fn frame_limit(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    let Some(fps) = ctx.settings.features.frame_limit else {
        return;
    };

    match (ctx.os, ctx.runtime.kind) {
        (HostOs::Linux, RuntimeKind::TranslationLayer | RuntimeKind::BottleManager) => {
            draft.set("DXVK_FRAME_RATE", fps.to_string());
        }
        (os, kind) => draft.warn(
            "frame-limit",
            format!(
                "frame limit is not supported for {} on {}; use the compositor fps limiter",
                kind.as_str(),
                os.as_str()
            ),
        ),
    }
}

fn fsr(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    let wine_on_linux = matches!(ctx.os, HostOs::Linux)
        && matches!(ctx.runtime.kind, RuntimeKind::TranslationLayer);
    if !wine_on_linux {
        draft.warn("fsr", "fullscreen FSR is only available for translation layers on linux");
        return;
    }

    draft.set("WINE_FULLSCREEN_FSR", "1");
    if let Some(sharpness) = ctx.settings.features.fsr_sharpness {
        draft.set("WINE_FULLSCREEN_FSR_STRENGTH", sharpness.min(5).to_string());
    }
}

fn gpu_offload(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    if !matches!(ctx.os, HostOs::Linux) {
        draft.warn("gpu-offload", "GPU offload variables only apply on linux");
        return;
    }

    draft.set("__NV_PRIME_RENDER_OFFLOAD", "1");
    draft.set("__GLX_VENDOR_LIBRARY_NAME", "nvidia");
    draft.set("DRI_PRIME", "1");
}

fn emulation_flags(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    if !matches!(ctx.os, HostOs::MacOs) {
        draft.warn("emulation", "AVX advertisement only applies to x86 translation on macos");
        return;
    }

    draft.set("ROSETTA_ADVERTISE_AVX", "1");
}

fn verbose_diagnostics(ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
    draft.set_default("WINEDEBUG", "+timestamp,+pid,+tid,+seh,+debugstr,+module");
    draft.set_default("DXVK_LOG_LEVEL", "info");
    draft.set_default("VKD3D_DEBUG", "warn");

    if ctx.runtime.is_proton() {
        draft.set_default("PROTON_LOG", "1");
    } else if matches!(ctx.runtime.kind, RuntimeKind::Toolkit) {
        draft.set_default("MTL_DEBUG_LAYER", "1");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_are_unique_and_runtime_runs_first() {
        let mut names = RULES.iter().map(|rule| rule.name).collect::<Vec<_>>();
        assert_eq!(names.first().copied(), Some("runtime"));
        assert_eq!(names.last().copied(), Some("verbose-logs"));

        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }
}
