#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use hdnet_3d as k3d;

#[doc(inline)]
pub use hdnet_nn as nn;

#[doc(inline)]
pub use hdnet_loss as loss;
