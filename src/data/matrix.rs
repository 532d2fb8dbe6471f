use super::handler::next_id;
use super::handler::DataHandler;
use super::value::OperandType;
use super::value::Value;
use crate::error::Error;
use crate::error::Result;
use crate::DataHash;
use std::hash::Hash;
use std::hash::Hasher;

/// a row-major 2-D matrix of double-precision cells.
///
/// serves single cells, 1-D windows within a row, and 2-D windows.
/// window addresses enumerate only the placements where the whole
/// window fits: an h x w window over an r x c matrix has
/// (r - h + 1) * (c - w + 1) valid anchors, addressed row-major over
/// the anchor grid.
#[derive(Debug, Clone)]
pub struct Matrix2D {
    id: u64,
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl Matrix2D {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            id: next_id(),
            rows,
            cols,
            cells: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.cells[row * self.cols + col] = value;
    }

    pub fn cell(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.cols + col]
    }

    pub fn cells_mut(&mut self) -> &mut [f64] {
        &mut self.cells
    }

    fn window2d(&self, h: usize, w: usize, address: usize) -> Value {
        let anchors_per_row = self.cols - w + 1;
        let row = address / anchors_per_row;
        let col = address % anchors_per_row;
        let mut cells = Vec::with_capacity(h * w);
        for r in row..row + h {
            let start = r * self.cols + col;
            cells.extend_from_slice(&self.cells[start..start + w]);
        }
        Value::Window2D { rows: h, cols: w, cells }
    }
}

impl DataHandler for Matrix2D {
    fn id(&self) -> u64 {
        self.id
    }

    fn address_space(&self, shape: OperandType) -> usize {
        match shape {
            OperandType::Scalar => self.rows * self.cols,
            OperandType::Window(n) if n > 0 && n <= self.cols => {
                self.rows * (self.cols - n + 1)
            }
            OperandType::Window2D(h, w)
                if h > 0 && w > 0 && h <= self.rows && w <= self.cols =>
            {
                (self.rows - h + 1) * (self.cols - w + 1)
            }
            _ => 0,
        }
    }

    fn largest_address_space(&self) -> usize {
        self.rows * self.cols
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
                let anchors_per_row = self.cols - n + 1;
                let row = address / anchors_per_row;
                let col = address % anchors_per_row;
                let start = row * self.cols + col;
                Ok(Value::Window(self.cells[start..start + n].to_vec()))
            }
            OperandType::Window2D(h, w) => Ok(self.window2d(h, w, address)),
            _ => Err(Error::TypeMismatch(shape.to_string())),
        }
    }

    fn hash(&self) -> DataHash {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.rows.hash(&mut hasher);
        self.cols.hash(&mut hasher);
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
