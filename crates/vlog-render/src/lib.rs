//! GPU composition core for the vlog engine.
//!
//! The pipeline is a bounded pull loop: frame sources normalize inputs to
//! packed RGB, the compositor blends them on the GPU (borders, typewriter
//! subtitle, shader transitions), and the encoder sink consumes composited
//! frames one by one. `jobs` exposes the one-shot and incremental session
//! operations built on top.

pub mod compositor;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod jobs;
pub mod overlay;
pub mod schedule;
pub mod shaders;
pub mod subtitle;
pub mod template;

pub use compositor::{BorderKind, Compositor};
pub use driver::RenderDriver;
pub use error::{RenderError, RenderResult};
pub use jobs::{
    render_oneshot, session_append, session_finalize, session_init, session_status,
    AppendOutcome, FinalizeOutcome, InitOutcome, RenderContext,
};
pub use schedule::RenderSchedule;
pub use template::{LoadedTemplate, TemplateStore, TemplateSummary, TransitionEffect};
