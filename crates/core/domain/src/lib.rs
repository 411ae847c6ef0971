//! 车辆读数链路共享的领域模型。
//!
//! - [`reading`]：读数、传感器类型与有效性校验
//! - [`window`]：自然日时间窗口
//! - [`cancel`]：显式传递的取消信号
//! - [`policy`]：可配置的处理策略

pub mod cancel;
pub mod policy;
pub mod reading;
pub mod window;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use policy::{GapFill, InvalidPolicy, ParsePolicyError};
pub use reading::{InvalidReading, Reading, ReadingPayload, SensorType, UnknownSensor};
pub use window::DayWindow;
