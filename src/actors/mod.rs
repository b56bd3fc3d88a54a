// Actor模块 - 使用Actor模式管理并发状态
//
// 用Actor模式替代Arc<Mutex<T>>，通过消息传递实现并发控制
// 会话阶段与识别结果分别由独立的Actor持有

pub mod results;
pub mod session;

pub use results::{ResultsActor, ResultsCommand, ResultsHandle};
pub use session::{SessionActor, SessionCommand, SessionHandle, WeakSessionHandle};
