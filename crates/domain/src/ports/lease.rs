use async_trait::async_trait;
use pollmaster_core::DispatchResult;

/// 集群范围的具名租约
///
/// 同一个租约id在任意时刻最多只有一个持有者。持有者进程崩溃时租约随连接一起失效。
#[async_trait]
pub trait LeaseService: Send + Sync {
    /// 阻塞直到获得租约
    ///
    /// 实现必须可以安全地在任意 await 点被丢弃，调用方通过
    /// `tokio::select!` 与关闭信号竞争来取消等待。
    async fn acquire(&self, lease_id: i64, holder: &str) -> DispatchResult<()>;

    /// 当前持有者是否仍然持有租约
    async fn is_held(&self, lease_id: i64, holder: &str) -> DispatchResult<bool>;

    /// 立即释放租约，未持有时是空操作
    async fn release(&self, lease_id: i64, holder: &str) -> DispatchResult<()>;
}
