//! Element factories and their static metadata.
//!
//! A factory describes a transformation element before any instance
//! exists: its pad templates (direction + template caps) and a
//! classification string. The planner consumes factories through the
//! [`ElementFactory`] trait; instances created for sandbox negotiation or
//! for the live graph implement [`TransformElement`].
//!
//! [`CapsTransformFactory`] is the concrete single-sink/single-src factory
//! used throughout the tests; hosts with richer elements provide their own
//! trait impls. [`SplitterFactory`] and [`NullSinkFactory`] are the two
//! utility factories the instantiator requires.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use compact_str::CompactString;

use crate::caps::Caps;

// =============================================================================
// Pad templates
// =============================================================================

/// Which way a pad faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadDirection {
    /// Consumes data (upstream-facing).
    Sink,
    /// Produces data (downstream-facing).
    Src,
}

/// A named pad slot a factory's elements expose, with template caps.
#[derive(Debug, Clone)]
pub struct PadTemplate {
    name: CompactString,
    direction: PadDirection,
    caps: Caps,
}

impl PadTemplate {
    pub fn new(name: impl AsRef<str>, direction: PadDirection, caps: Caps) -> Self {
        Self {
            name: CompactString::from(name.as_ref()),
            direction,
            caps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    pub fn caps(&self) -> &Caps {
        &self.caps
    }
}

// =============================================================================
// Klass mask
// =============================================================================

bitflags! {
    /// Bitset over the classification tokens the chain validators care
    /// about, derived from a factory's classification string.
    pub struct KlassMask: u8 {
        const PARSER    = 0b0001;
        const DECODER   = 0b0010;
        const CONVERTER = 0b0100;
        const ENCODER   = 0b1000;
    }
}

/// Pipeline stages in the order a well-formed chain visits them,
/// sink to src.
const STAGE_ORDER: [KlassMask; 4] = [
    KlassMask::PARSER,
    KlassMask::DECODER,
    KlassMask::CONVERTER,
    KlassMask::ENCODER,
];

impl KlassMask {
    /// Derive the mask by substring-matching the known tokens against a
    /// factory's classification string.
    pub fn from_klass(klass: &str) -> Self {
        let mut mask = KlassMask::empty();
        if klass.contains("Parser") {
            mask |= KlassMask::PARSER;
        }
        if klass.contains("Decoder") {
            mask |= KlassMask::DECODER;
        }
        if klass.contains("Converter") {
            mask |= KlassMask::CONVERTER;
        }
        if klass.contains("Encoder") {
            mask |= KlassMask::ENCODER;
        }
        mask
    }

    /// Index of the first stage whose bit is set, in sink-to-src order
    /// (parser, decoder, converter, encoder). `None` for an empty mask.
    pub fn first_stage(&self) -> Option<usize> {
        STAGE_ORDER.iter().position(|stage| self.contains(*stage))
    }
}

// =============================================================================
// Factory and element traits
// =============================================================================

/// Constructor for transformation elements.
///
/// Factories are immutable and shared (`Arc<dyn ElementFactory>`); the
/// factory index keeps references into the catalog the policy provides.
pub trait ElementFactory: Send + Sync {
    /// Stable factory name, unique within a catalog.
    fn name(&self) -> &str;

    /// Classification string; may contain the tokens `Parser`, `Decoder`,
    /// `Converter`, `Encoder`.
    fn klass(&self) -> &str;

    /// Static pad templates.
    fn pad_templates(&self) -> &[PadTemplate];

    /// Create a fresh element instance.
    fn create(&self) -> Box<dyn TransformElement>;

    /// The (sink, src) template pair when this factory has exactly one of
    /// each; factories of any other shape are skipped by the index.
    fn single_templates(&self) -> Option<(&PadTemplate, &PadTemplate)> {
        let mut sink = None;
        let mut src = None;
        for tmpl in self.pad_templates() {
            match tmpl.direction() {
                PadDirection::Sink => {
                    if sink.replace(tmpl).is_some() {
                        return None;
                    }
                }
                PadDirection::Src => {
                    if src.replace(tmpl).is_some() {
                        return None;
                    }
                }
            }
        }
        Some((sink?, src?))
    }
}

/// A live (or sandboxed) element instance.
///
/// Instances only need to take part in capability negotiation; the data
/// path of the built graph belongs to the host.
pub trait TransformElement: Send {
    /// Name of the factory that created this instance.
    fn factory_name(&self) -> &str;

    /// Template caps on the sink side.
    fn sink_caps(&self) -> &Caps;

    /// Template caps on the src side.
    fn src_caps(&self) -> &Caps;

    /// Caps producible on the opposite side when `caps` is offered on
    /// `from`. The default is pure template substitution: anything
    /// intersecting the near-side template yields the far-side template.
    fn transform_caps(&self, from: PadDirection, caps: &Caps) -> Caps {
        let (near, far) = match from {
            PadDirection::Sink => (self.sink_caps(), self.src_caps()),
            PadDirection::Src => (self.src_caps(), self.sink_caps()),
        };
        if caps.intersects(near) {
            far.clone()
        } else {
            Caps::empty()
        }
    }

    /// Accepted caps on the sink side, optionally filtered.
    fn query_sink_caps(&self, filter: &Caps) -> Caps {
        self.sink_caps().intersect_with_filter(filter)
    }
}

// =============================================================================
// CapsTransformFactory — the reference implementation
// =============================================================================

/// A single-sink/single-src factory whose elements accept anything
/// intersecting the sink template and produce the src template.
///
/// # Example
///
/// ```
/// use autoroute::caps::Caps;
/// use autoroute::factory::CapsTransformFactory;
///
/// let dec = CapsTransformFactory::new(
///     "h264dec",
///     "Codec/Decoder/Video",
///     Caps::media("video/x-h264"),
///     Caps::media("video/x-raw"),
/// );
/// ```
pub struct CapsTransformFactory {
    name: CompactString,
    klass: CompactString,
    templates: [PadTemplate; 2],
}

impl CapsTransformFactory {
    pub fn new(
        name: impl AsRef<str>,
        klass: impl AsRef<str>,
        sink_caps: Caps,
        src_caps: Caps,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: CompactString::from(name.as_ref()),
            klass: CompactString::from(klass.as_ref()),
            templates: [
                PadTemplate::new("sink", PadDirection::Sink, sink_caps),
                PadTemplate::new("src", PadDirection::Src, src_caps),
            ],
        })
    }
}

impl ElementFactory for CapsTransformFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn klass(&self) -> &str {
        &self.klass
    }

    fn pad_templates(&self) -> &[PadTemplate] {
        &self.templates
    }

    fn create(&self) -> Box<dyn TransformElement> {
        Box::new(TemplateElement {
            factory_name: self.name.clone(),
            sink: self.templates[0].caps().clone(),
            src: self.templates[1].caps().clone(),
        })
    }
}

impl fmt::Debug for CapsTransformFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapsTransformFactory")
            .field("name", &self.name)
            .field("klass", &self.klass)
            .finish()
    }
}

/// Element backed purely by its factory's templates.
struct TemplateElement {
    factory_name: CompactString,
    sink: Caps,
    src: Caps,
}

impl TransformElement for TemplateElement {
    fn factory_name(&self) -> &str {
        &self.factory_name
    }

    fn sink_caps(&self) -> &Caps {
        &self.sink
    }

    fn src_caps(&self) -> &Caps {
        &self.src
    }
}

// =============================================================================
// Utility factories required by the instantiator
// =============================================================================

/// Fan-out element: one sink, any number of identical src pads. Caps pass
/// through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitterFactory;

impl SplitterFactory {
    pub const NAME: &'static str = "splitter";
}

/// Terminates an otherwise unconnected input endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSinkFactory;

impl NullSinkFactory {
    pub const NAME: &'static str = "null-sink";
}

fn utility_templates_splitter() -> &'static [PadTemplate] {
    use std::sync::OnceLock;
    static TEMPLATES: OnceLock<[PadTemplate; 2]> = OnceLock::new();
    TEMPLATES.get_or_init(|| {
        [
            PadTemplate::new("sink", PadDirection::Sink, Caps::any()),
            PadTemplate::new("src_%u", PadDirection::Src, Caps::any()),
        ]
    })
}

fn utility_templates_null_sink() -> &'static [PadTemplate] {
    use std::sync::OnceLock;
    static TEMPLATES: OnceLock<[PadTemplate; 1]> = OnceLock::new();
    TEMPLATES
        .get_or_init(|| [PadTemplate::new("sink", PadDirection::Sink, Caps::any())])
}

impl ElementFactory for SplitterFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn klass(&self) -> &str {
        "Generic"
    }

    fn pad_templates(&self) -> &[PadTemplate] {
        utility_templates_splitter()
    }

    fn create(&self) -> Box<dyn TransformElement> {
        Box::new(TemplateElement {
            factory_name: CompactString::from(Self::NAME),
            sink: Caps::any(),
            src: Caps::any(),
        })
    }
}

impl ElementFactory for NullSinkFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn klass(&self) -> &str {
        "Sink"
    }

    fn pad_templates(&self) -> &[PadTemplate] {
        utility_templates_null_sink()
    }

    fn create(&self) -> Box<dyn TransformElement> {
        Box::new(TemplateElement {
            factory_name: CompactString::from(Self::NAME),
            sink: Caps::any(),
            src: Caps::empty(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_klass_mask_from_string() {
        let mask = KlassMask::from_klass("Codec/Decoder/Video");
        assert_eq!(mask, KlassMask::DECODER);

        let mask = KlassMask::from_klass("Codec/Parser/Converter");
        assert!(mask.contains(KlassMask::PARSER));
        assert!(mask.contains(KlassMask::CONVERTER));
        assert!(!mask.contains(KlassMask::ENCODER));

        assert_eq!(KlassMask::from_klass("Filter/Effect"), KlassMask::empty());
    }

    #[test]
    fn test_first_stage_ordering() {
        assert_eq!(KlassMask::PARSER.first_stage(), Some(0));
        assert_eq!(KlassMask::DECODER.first_stage(), Some(1));
        assert_eq!(KlassMask::CONVERTER.first_stage(), Some(2));
        assert_eq!(KlassMask::ENCODER.first_stage(), Some(3));
        // Combined masks resolve to the earliest stage
        assert_eq!((KlassMask::DECODER | KlassMask::ENCODER).first_stage(), Some(1));
        assert_eq!(KlassMask::empty().first_stage(), None);
    }

    #[test]
    fn test_single_templates_shape() {
        let fac = CapsTransformFactory::new(
            "conv",
            "Converter/Video",
            Caps::media("video/x-raw-rgb"),
            Caps::media("video/x-raw-yuv"),
        );
        let (sink, src) = fac.single_templates().unwrap();
        assert_eq!(sink.name(), "sink");
        assert_eq!(src.name(), "src");

        // Splitter has a src template but requests many pads; it is still
        // single-shaped from the template point of view.
        assert!(SplitterFactory.single_templates().is_some());
        // Null sink has no src template at all.
        assert!(NullSinkFactory.single_templates().is_none());
    }

    #[test]
    fn test_template_element_transform() {
        let fac = CapsTransformFactory::new(
            "conv",
            "Converter/Video",
            Caps::media("video/x-raw-rgb"),
            Caps::media("video/x-raw-yuv"),
        );
        let elem = fac.create();

        let out = elem.transform_caps(PadDirection::Sink, &Caps::media("video/x-raw-rgb"));
        assert_eq!(out, Caps::media("video/x-raw-yuv"));

        let none = elem.transform_caps(PadDirection::Sink, &Caps::media("audio/x-raw"));
        assert!(none.is_empty());

        // Reverse direction answers what the element could consume
        let back = elem.transform_caps(PadDirection::Src, &Caps::media("video/x-raw-yuv"));
        assert_eq!(back, Caps::media("video/x-raw-rgb"));
    }

    #[test]
    fn test_query_sink_caps_filtered() {
        let fac = CapsTransformFactory::new(
            "conv",
            "Converter/Video",
            Caps::media("video/x-raw-rgb").union(&Caps::media("video/x-raw-yuv")),
            Caps::media("video/x-raw-yuv"),
        );
        let elem = fac.create();

        let accepted = elem.query_sink_caps(&Caps::media("video/x-raw-rgb"));
        assert_eq!(accepted, Caps::media("video/x-raw-rgb"));

        let all = elem.query_sink_caps(&Caps::empty());
        assert_eq!(all.len(), 2);
    }
}
