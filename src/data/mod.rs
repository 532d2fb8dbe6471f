pub mod array;
pub mod constant;
pub mod handler;
pub mod matrix;
pub mod value;

pub use array::PrimitiveArray;
pub use constant::Constant;
pub use constant::ConstantHandler;
pub use handler::DataHandler;
pub use matrix::Matrix2D;
pub use value::OperandType;
pub use value::Value;
