use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    // 已入队但尚未 task_done 的数量（排队中 + 处理中）
    unfinished: usize,
    pushed: u64,
    popped: u64,
}

/// 线程安全的 FIFO 任务队列，默认无界，可选容量上限（满时 push 等待）
#[derive(Debug)]
pub struct TaskQueue<T> {
    name: &'static str,
    capacity: Option<usize>,
    state: Mutex<QueueState<T>>,
    item_ready: Notify,
    space_ready: Notify,
}

impl<T> TaskQueue<T> {
    pub fn unbounded(name: &'static str) -> Self {
        Self::with_capacity(name, None)
    }

    pub fn bounded(name: &'static str, capacity: usize) -> Self {
        Self::with_capacity(name, Some(capacity.max(1)))
    }

    pub fn with_capacity(name: &'static str, capacity: Option<usize>) -> Self {
        Self {
            name,
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
                pushed: 0,
                popped: 0,
            }),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入队；有界队列满时等待消费者腾出空间
    pub async fn push(&self, item: T) {
        let mut item = Some(item);
        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.state();
                let full = self.capacity.is_some_and(|cap| state.items.len() >= cap);
                if !full {
                    if let Some(item) = item.take() {
                        state.items.push_back(item);
                        state.unfinished += 1;
                        state.pushed += 1;
                    }
                    drop(state);
                    self.item_ready.notify_one();
                    return;
                }
            }

            space.await;
        }
    }

    /// 非阻塞出队，取出的任务计入"处理中"，处理完必须调用 task_done
    pub fn try_pop(&self) -> Option<T> {
        let item = {
            let mut state = self.state();
            let item = state.items.pop_front();
            if item.is_some() {
                state.popped += 1;
            }
            item
        };
        if item.is_some() && self.capacity.is_some() {
            self.space_ready.notify_one();
        }
        item
    }

    /// 最多等待 `wait`，超时返回 None
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        let deadline = Instant::now() + wait;
        loop {
            let ready = self.item_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if timeout_at(deadline, ready).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// 标记一个已取出的任务处理完毕
    pub fn task_done(&self) {
        let mut state = self.state();
        state.unfinished = state.unfinished.saturating_sub(1);
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    /// 队列为空且没有处理中的任务
    ///
    /// 每次成功的 `try_pop` / `pop_timeout` 都必须对应一次 `task_done`，
    /// 否则计数不会归零，收尾阶段会一直等待。
    pub fn is_drained(&self) -> bool {
        self.state().unfinished == 0
    }

    pub fn total_pushed(&self) -> u64 {
        self.state().pushed
    }

    pub fn total_popped(&self) -> u64 {
        self.state().popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::unbounded("test");
        for i in 0..5 {
            queue.push(i).await;
        }
        let mut out = Vec::new();
        while let Some(i) = queue.try_pop() {
            out.push(i);
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.total_pushed(), 5);
        assert_eq!(queue.total_popped(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_timeout_on_empty_queue() {
        let queue: TaskQueue<u32> = TaskQueue::unbounded("test");
        let started = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_secs(1)).await, None);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(TaskQueue::unbounded("test"));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("task").await;
        assert_eq!(consumer.await.unwrap(), Some("task"));
    }

    #[tokio::test]
    async fn test_drained_tracks_in_flight_items() {
        let queue = TaskQueue::unbounded("test");
        assert!(queue.is_drained());

        queue.push(1).await;
        assert!(!queue.is_drained());

        let item = queue.try_pop();
        assert_eq!(item, Some(1));
        // 已出队但未完成
        assert!(queue.is_empty());
        assert!(!queue.is_drained());

        queue.task_done();
        assert!(queue.is_drained());
    }

    #[tokio::test]
    async fn test_each_item_delivered_once() {
        let queue = Arc::new(TaskQueue::unbounded("test"));
        for i in 0..200 {
            queue.push(i).await;
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(i) = queue.pop_timeout(Duration::from_millis(50)).await {
                    got.push(i);
                    queue.task_done();
                }
                got
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
        assert!(queue.is_drained());
    }

    #[tokio::test]
    async fn test_bounded_push_waits_for_space() {
        let queue = Arc::new(TaskQueue::bounded("test", 1));
        queue.push(1).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.try_pop(), Some(1));
        producer.await.unwrap();
        assert_eq!(queue.try_pop(), Some(2));
    }
}
