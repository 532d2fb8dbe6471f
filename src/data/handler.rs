use super::value::OperandType;
use super::value::Value;
use crate::error::Result;
use crate::DataHash;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// hand out a fresh handler identity. clones keep the identity of the
/// original, which is what lets the archive replay a program against a
/// snapshot of the sources it originally ran on.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// a typed, addressable view over fixed-size memory.
///
/// programs never see concrete containers; they fetch operands through
/// this capability. an address is valid per operand shape: each shape
/// has its own address space, and raw addresses are folded into it with
/// the modulo rule of `scale`.
pub trait DataHandler: Send + Sync {
    /// stable identity, preserved across clones.
    fn id(&self) -> u64;

    /// number of addressable locations for the given shape.
    /// zero means the shape is not providable.
    fn address_space(&self, shape: OperandType) -> usize;

    /// largest address space over every shape this handler provides.
    fn largest_address_space(&self) -> usize;

    /// fetch the value of the given shape at the given address.
    fn get(&self, shape: OperandType, address: u64) -> Result<Value>;

    /// deterministic hash of the current contents.
    fn hash(&self) -> DataHash;

    /// deep copy with the same identity and contents.
    fn clone_handler(&self) -> Box<dyn DataHandler>;

    /// restore pristine contents.
    fn reset(&mut self);

    /// whether the shape is providable at all.
    fn provides(&self, shape: OperandType) -> bool {
        self.address_space(shape) > 0
    }

    /// fold a raw line address into the valid space for the shape.
    /// every engine must apply this identically for behavior equality
    /// between execution and liveness analysis to hold.
    fn scale(&self, address: u64, shape: OperandType) -> u64 {
        match self.address_space(shape) {
            0 => address,
            space => address % space as u64,
        }
    }
}

/// fold the hashes of an ordered set of handlers into one.
pub fn combined_hash(handlers: &[&dyn DataHandler]) -> DataHash {
    handlers
        .iter()
        .fold(0u64, |acc, h| acc.rotate_left(7) ^ h.hash())
}
