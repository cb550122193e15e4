// ═══════════════════════════════════════════════════════════
// Rendering — where resolved countries and failures end up
// ═══════════════════════════════════════════════════════════

use std::cell::{Ref, RefCell};
use std::io::Write;
use std::rc::Rc;

use crate::error::LookupError;
use crate::model::CountrySummary;

/// Which slot a country is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Primary,
    Neighbour,
}

pub trait Renderer {
    fn render_success(&mut self, country: &CountrySummary, variant: Variant);
    fn render_error(&mut self, message: &str);
}

/// The renderer one invocation writes to.
///
/// Cloned into every continuation of a chain; all clones share the same
/// renderer, so concurrent chains on separate contexts never see each
/// other's output.
pub struct RenderContext<R> {
    renderer: Rc<RefCell<R>>,
}

impl<R> Clone for RenderContext<R> {
    fn clone(&self) -> Self {
        RenderContext { renderer: Rc::clone(&self.renderer) }
    }
}

impl<R: Renderer> RenderContext<R> {
    pub fn new(renderer: R) -> Self {
        RenderContext { renderer: Rc::new(RefCell::new(renderer)) }
    }

    pub fn success(&self, country: &CountrySummary, variant: Variant) {
        self.renderer.borrow_mut().render_success(country, variant);
    }

    /// Renders `error` as the user-facing failure message.
    pub fn error(&self, error: &LookupError) {
        self.renderer.borrow_mut().render_error(&error.user_message());
    }

    pub fn renderer(&self) -> Ref<'_, R> {
        self.renderer.borrow()
    }
}

// ── Terminal card ─────────────────────────────────────────────────────────────

/// Writes each country as a small text card.
///
///   Germany (Europe)
///      👫 83.0M people
///      🗣️ German
///      💰 Euro
///      🏳️ https://flagcdn.com/de.svg
pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        TerminalRenderer { out }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }
}

pub fn format_card(country: &CountrySummary, variant: Variant) -> String {
    let heading = match variant {
        Variant::Primary => format!("{} ({})", country.name, country.region),
        Variant::Neighbour => format!("Neighbour: {} ({})", country.name, country.region),
    };
    format!(
        "{}\n   👫 {:.1}M people\n   🗣️ {}\n   💰 {}\n   🏳️ {}\n",
        heading, country.population_millions, country.primary_language, country.primary_currency, country.flag_url
    )
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render_success(&mut self, country: &CountrySummary, variant: Variant) {
        let card = format_card(country, variant);
        if let Err(e) = writeln!(self.out, "{}", card).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "could not write country card");
        }
    }

    fn render_error(&mut self, message: &str) {
        if let Err(e) = writeln!(self.out, "{}", message).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "could not write error message");
        }
    }
}
