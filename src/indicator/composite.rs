use crate::{
    cache::RunContext,
    cache::key::{Fingerprint, KeyBuilder},
    foundation::core::Year,
    foundation::error::{AnimError, AnimResult},
    indicator::Indicator,
    render::frame::FrameRGBA,
};

/// One layer of a [`CompositeIndicator`].
#[derive(Clone, Debug)]
pub struct CompositeChild {
    pub indicator: Indicator,
    /// Draw order; lower first. Ties keep insertion order.
    pub z: i32,
    pub opacity: f32,
}

/// Several indicators drawn on top of each other in one panel (for example disturbances
/// over a carbon-flux map).
#[derive(Clone, Debug)]
pub struct CompositeIndicator {
    name: String,
    title: String,
    children: Vec<CompositeChild>,
    fingerprint: Fingerprint,
}

impl CompositeIndicator {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        children: Vec<CompositeChild>,
    ) -> AnimResult<Self> {
        let name = name.into();
        if children.is_empty() {
            return Err(AnimError::validation(format!(
                "composite '{name}' needs at least one child"
            )));
        }
        if let Some(bad) = children
            .iter()
            .find(|c| !(c.opacity.is_finite() && (0.0..=1.0).contains(&c.opacity)))
        {
            return Err(AnimError::validation(format!(
                "composite '{name}': child '{}' opacity must be within [0, 1]",
                bad.indicator.name()
            )));
        }
        let mut children = children;
        // stable sort: equal z keeps insertion order
        children.sort_by_key(|c| c.z);

        let mut kb = KeyBuilder::new("composite_indicator");
        kb.str(&name).u64(children.len() as u64);
        for c in &children {
            kb.fingerprint(c.indicator.fingerprint())
                .i64(i64::from(c.z))
                .u64(u64::from(c.opacity.to_bits()));
        }
        Ok(Self {
            name,
            title: title.into(),
            children,
            fingerprint: kb.finish(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Children in draw order.
    pub fn children(&self) -> &[CompositeChild] {
        &self.children
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn has_data(&self, year: Year) -> bool {
        self.children.iter().any(|c| c.indicator.has_data(year))
    }

    pub fn is_failed(&self, year: Year) -> bool {
        self.children.iter().any(|c| c.indicator.is_failed(year))
    }

    /// Children with data for `year`, composited bottom-up at the size of the first one.
    /// When no child has data the bottom child's blank panel is returned. A child whose
    /// source failed for `year` fails the whole panel.
    #[tracing::instrument(skip(self, ctx), fields(indicator = %self.name))]
    pub fn render(&self, year: Year, ctx: &RunContext) -> AnimResult<FrameRGBA> {
        let mut out: Option<FrameRGBA> = None;
        let drawn = self
            .children
            .iter()
            .filter(|c| c.indicator.has_data(year) || c.indicator.is_failed(year));
        for child in drawn {
            let panel = child.indicator.render(year, ctx)?;
            let base = out.get_or_insert_with(|| {
                FrameRGBA::transparent(panel.width, panel.height).with_scale(panel.scale_m)
            });
            let panel = if (panel.width, panel.height) == (base.width, base.height) {
                panel
            } else {
                panel.resized(base.width, base.height)
            };
            base.draw_over(&panel, 0, 0, child.opacity);
        }
        match out {
            Some(frame) => Ok(frame),
            None => {
                tracing::debug!(year, "no child has data");
                self.children[0].indicator.render(year, ctx)
            }
        }
    }
}
