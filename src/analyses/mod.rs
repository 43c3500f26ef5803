//! Static analyses over the IR: integer range bounds, dependence testing
//! between memory accesses, roofline cost estimation, and small collector
//! utilities the transforms share.

pub mod collect;
pub mod cost;
pub mod dependence;
pub mod range;
