// ═══════════════════════════════════════════════════════════
// Batch lookups — several independent countries at once
// ═══════════════════════════════════════════════════════════

use std::fmt;

use crate::combinator::{all, all_settled, any, race};
use crate::model::CountrySummary;
use crate::render::{RenderContext, Renderer, Variant};
use crate::resolver::Resolver;
use crate::task::Task;

/// How the individual lookups are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BatchMode {
    /// Every country, or the first failure.
    #[default]
    All,
    /// Whichever lookup settles first.
    Race,
    /// The first lookup to succeed.
    Any,
    /// Every lookup, failures included.
    Settled,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchMode::All => "all",
            BatchMode::Race => "race",
            BatchMode::Any => "any",
            BatchMode::Settled => "settled",
        };
        f.write_str(name)
    }
}

/// Looks up every name and renders what `mode` lets through.
///
/// Fulfils with the countries that were rendered. In `Settled` mode each
/// failure is rendered on its own and the task never fails; in the other
/// modes a failure of the combined task is rendered once.
pub fn lookup<R: Renderer + 'static>(
    resolver: &Resolver,
    names: &[String],
    mode: BatchMode,
    ctx: &RenderContext<R>,
) -> Task<Vec<CountrySummary>> {
    let scheduler = resolver.scheduler().clone();
    let tasks: Vec<Task<CountrySummary>> = names.iter().map(|name| resolver.country_by_name(name)).collect();
    tracing::debug!(%mode, count = tasks.len(), "batch lookup");

    let render = ctx.clone();
    let combined = match mode {
        BatchMode::All => all(&scheduler, tasks),
        BatchMode::Race => race(&scheduler, tasks).map(|country| vec![country]),
        BatchMode::Any => any(&scheduler, tasks).map(|country| vec![country]),
        BatchMode::Settled => {
            let per_item = ctx.clone();
            all_settled(&scheduler, tasks).map(move |outcomes| {
                outcomes
                    .into_iter()
                    .filter_map(|outcome| outcome.map_err(|error| per_item.error(&error)).ok())
                    .collect()
            })
        }
    };

    let catch = ctx.clone();
    combined
        .inspect(move |countries| {
            for country in countries {
                render.success(country, Variant::Primary);
            }
        })
        .inspect_err(move |error| {
            tracing::warn!(%error, "batch lookup failed");
            catch.error(error);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::fetch::Fetcher;
    use crate::resolver::tests::{country, endpoints, Recorder, StubTransport};
    use crate::scheduler::Scheduler;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn setup(sched: &Scheduler) -> Resolver {
        let stub = StubTransport::default()
            .route("http://countries.test/v2/name/portugal", 200, json!([country("Portugal", &["ESP"])]))
            .route("http://countries.test/v2/name/canada", 200, json!([country("Canada", &["USA"])]))
            .route("http://countries.test/v2/name/nowhere", 404, json!({"status": 404}));
        Resolver::new(Fetcher::new(sched, Arc::new(stub)), endpoints())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_renders_in_input_order() {
        let sched = Scheduler::new();
        let ctx = RenderContext::new(Recorder::default());
        let done = lookup(&setup(&sched), &names(&["portugal", "canada"]), BatchMode::All, &ctx);
        sched.run();

        assert_eq!(done.outcome().map(|o| o.map(|v| v.len())), Some(Ok(2)));
        assert_eq!(
            ctx.renderer().successes,
            vec![("Portugal".to_string(), Variant::Primary), ("Canada".to_string(), Variant::Primary)]
        );
    }

    #[test]
    fn test_all_fails_once_and_renders_nothing_else() {
        let sched = Scheduler::new();
        let ctx = RenderContext::new(Recorder::default());
        let done = lookup(&setup(&sched), &names(&["portugal", "nowhere"]), BatchMode::All, &ctx);
        sched.run();

        assert_eq!(
            done.outcome().map(|o| o.map(|v| v.len())),
            Some(Err(LookupError::http_status(404, "Country not found")))
        );
        assert!(ctx.renderer().successes.is_empty());
        assert_eq!(ctx.renderer().errors.len(), 1);
    }

    #[test]
    fn test_any_ignores_failures() {
        let sched = Scheduler::new();
        let ctx = RenderContext::new(Recorder::default());
        let done = lookup(&setup(&sched), &names(&["nowhere", "canada"]), BatchMode::Any, &ctx);
        sched.run();

        assert_eq!(done.outcome().map(|o| o.map(|v| v[0].name.clone())), Some(Ok("Canada".to_string())));
        assert!(ctx.renderer().errors.is_empty());
    }

    #[test]
    fn test_settled_renders_every_outcome() {
        let sched = Scheduler::new();
        let ctx = RenderContext::new(Recorder::default());
        let done = lookup(&setup(&sched), &names(&["portugal", "nowhere", "canada"]), BatchMode::Settled, &ctx);
        sched.run();

        assert_eq!(done.outcome().map(|o| o.map(|v| v.len())), Some(Ok(2)));
        assert_eq!(ctx.renderer().successes.len(), 2);
        assert_eq!(ctx.renderer().errors, vec!["Something went wrong 💥 Country not found (404)".to_string()]);
    }

    #[test]
    fn test_race_renders_a_single_country() {
        let sched = Scheduler::new();
        let ctx = RenderContext::new(Recorder::default());
        let done = lookup(&setup(&sched), &names(&["portugal", "canada"]), BatchMode::Race, &ctx);
        sched.run();

        assert_eq!(done.outcome().map(|o| o.map(|v| v.len())), Some(Ok(1)));
        assert_eq!(ctx.renderer().successes.len(), 1);
    }
}
