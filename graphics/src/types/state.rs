//! Resource usage states.

/// The usage state a buffer or texture is in on the GPU timeline.
///
/// Copies and shader access require the resource to be in a matching state;
/// moving between states is recorded explicitly as a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// No particular usage; copies may implicitly promote from here.
    #[default]
    Common,
    /// Destination of a copy.
    CopyDest,
    /// Source of a copy.
    CopySource,
    /// Any read-only usage: vertex/index/constant input, copy source, shader read.
    GenericRead,
    /// Sampled by pixel shaders.
    PixelShaderResource,
    /// Sampled by non-pixel shader stages.
    NonPixelShaderResource,
    /// Read-write access from shaders.
    UnorderedAccess,
}

impl ResourceState {
    /// Whether a copy may write a resource in this state.
    pub fn allows_copy_dest(&self) -> bool {
        matches!(self, Self::CopyDest | Self::Common)
    }

    /// Whether a copy may read a resource in this state.
    pub fn allows_copy_source(&self) -> bool {
        matches!(self, Self::CopySource | Self::GenericRead | Self::Common)
    }

    /// Whether the state only permits reads.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::CopySource
                | Self::GenericRead
                | Self::PixelShaderResource
                | Self::NonPixelShaderResource
        )
    }
}
