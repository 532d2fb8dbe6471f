use super::handler::next_id;
use super::handler::DataHandler;
use super::value::OperandType;
use super::value::Value;
use crate::error::Error;
use crate::error::Result;
use crate::DataHash;
use std::hash::Hash;
use std::hash::Hasher;

/// a 1-D array of double-precision cells.
///
/// serves single cells and 1-D windows. the address space for a window
/// of n cells shrinks by n - 1 so that every window fits entirely
/// within the array. also doubles as the register bank of the program
/// engine.
#[derive(Debug, Clone)]
pub struct PrimitiveArray {
    id: u64,
    cells: Vec<f64>,
}

impl PrimitiveArray {
    pub fn new(size: usize) -> Self {
        Self {
            id: next_id(),
            cells: vec![0.0; size],
        }
    }

    pub fn from_cells(cells: Vec<f64>) -> Self {
        Self {
            id: next_id(),
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn set(&mut self, index: usize, value: f64) {
        self.cells[index] = value;
    }

    /// checked write, used by the program engine for destinations that
    /// may overflow the register file within their encoding width.
    pub fn try_set(&mut self, index: u64, value: f64) -> Result<()> {
        match self.cells.get_mut(index as usize) {
            Some(cell) => Ok(*cell = value),
            None => Err(Error::OutOfRange {
                address: index,
                space: self.cells.len(),
            }),
        }
    }

    pub fn cell(&self, index: usize) -> f64 {
        self.cells[index]
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [f64] {
        &mut self.cells
    }
}

impl DataHandler for PrimitiveArray {
    fn id(&self) -> u64 {
        self.id
    }

    fn address_space(&self, shape: OperandType) -> usize {
        match shape {
            OperandType::Scalar => self.cells.len(),
            OperandType::Window(n) if n > 0 && n <= self.cells.len() => {
                self.cells.len() - n + 1
            }
            _ => 0,
        }
    }

    fn largest_address_space(&self) -> usize {
        self.cells.len()
    }

    fn get(&self, shape: OperandType, address: u64) -> Result<Value> {
        let space = self.address_space(shape);
        if space == 0 {
            return Err(Error::TypeMismatch(shape.to_string()));
        }
        let address = address as usize;
        if address >= space {
            return Err(Error::OutOfRange {
                address: address as u64,
                space,
            });
        }
        match shape {
            OperandType::Scalar => Ok(Value::Scalar(self.cells[address])),
            OperandType::Window(n) => {
                Ok(Value::Window(self.cells[address..address + n].to_vec()))
            }
            _ => Err(Error::TypeMismatch(shape.to_string())),
        }
    }

    fn hash(&self) -> DataHash {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for cell in self.cells.iter() {
            cell.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }

    fn clone_handler(&self) -> Box<dyn DataHandler> {
        Box::new(self.clone())
    }

    fn reset(&mut self) {
        self.cells.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_space_is_the_full_array() {
        let array = PrimitiveArray::new(8);
        assert_eq!(array.address_space(OperandType::Scalar), 8);
        assert_eq!(array.largest_address_space(), 8);
    }

    #[test]
    fn window_space_shrinks_with_extent() {
        let array = PrimitiveArray::new(8);
        assert_eq!(array.address_space(OperandType::Window(3)), 6);
        assert_eq!(array.address_space(OperandType::Window(8)), 1);
        assert_eq!(array.address_space(OperandType::Window(9)), 0);
    }

    #[test]
    fn get_rejects_out_of_range_addresses() {
        let array = PrimitiveArray::new(4);
        assert!(matches!(
            array.get(OperandType::Scalar, 4),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn get_rejects_unsupported_shapes() {
        let array = PrimitiveArray::new(4);
        assert!(matches!(
            array.get(OperandType::Constant, 0),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn windows_read_consecutive_cells() {
        let array = PrimitiveArray::from_cells(vec![1.0, 2.0, 3.0, 4.0]);
        let window = array.get(OperandType::Window(2), 1).unwrap();
        assert_eq!(window, Value::Window(vec![2.0, 3.0]));
    }

    #[test]
    fn hash_is_stable_across_clones() {
        let mut array = PrimitiveArray::new(4);
        array.set(2, 42.0);
        let clone = array.clone_handler();
        assert_eq!(DataHandler::hash(&array), clone.hash());
    }

    #[test]
    fn hash_tracks_contents() {
        let mut array = PrimitiveArray::new(4);
        let before = DataHandler::hash(&array);
        array.set(0, 1.0);
        assert_ne!(before, DataHandler::hash(&array));
        array.reset();
        assert_eq!(before, DataHandler::hash(&array));
    }
}
