//! Ephemeral status items ("stories"): grouping for the board and the timed viewer.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{StatusId, User, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusItem {
    #[serde(rename = "_id")]
    pub identifier: StatusId,
    pub user: User,
    #[serde(rename = "mediaUrl")]
    pub media_url: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<Arc<str>>,
    #[serde(rename = "createdAt")]
    pub timestamp: DateTime<Utc>,
}

/// All status items of one user, oldest first.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusGroup {
    pub user: User,
    pub items: Vec<StatusItem>,
}

impl StatusGroup {
    /// The newest item, used as the group's thumbnail.
    pub fn latest(&self) -> Option<&StatusItem> {
        self.items.last()
    }
}

/// Status items grouped per user, with the viewer's own group kept apart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusBoard {
    pub mine: Option<StatusGroup>,
    pub others: Vec<StatusGroup>,
}

impl StatusBoard {
    pub fn new(items: impl IntoIterator<Item = StatusItem>, viewer: &UserId) -> Self {
        let mut order = Vec::<UserId>::new();
        let mut groups = HashMap::<UserId, StatusGroup>::new();
        for item in items {
            let owner = item.user.identifier.clone();
            groups
                .entry(owner.clone())
                .or_insert_with(|| {
                    order.push(owner);
                    StatusGroup {
                        user: item.user.clone(),
                        items: Vec::new(),
                    }
                })
                .items
                .push(item);
        }
        for group in groups.values_mut() {
            group.items.sort_by_key(|item| item.timestamp);
        }

        let mine = groups.remove(viewer);
        let others = order
            .into_iter()
            .filter_map(|owner| groups.remove(&owner))
            .collect();
        Self { mine, others }
    }

    pub fn is_empty(&self) -> bool {
        self.mine.is_none() && self.others.is_empty()
    }

    /// The viewer's group first, then everyone else in board order.
    pub fn groups(&self) -> impl Iterator<Item = &StatusGroup> {
        self.mine.iter().chain(&self.others)
    }
}

/// Ticks until the current item is done; at one tick per 40ms that is four seconds.
pub const FULL_PROGRESS: u8 = 100;

/// Sequential viewer over one user's status items.
#[derive(Clone, Debug)]
pub struct StatusViewer {
    items: Vec<StatusItem>,
    index: usize,
    progress: u8,
    open: bool,
}

impl StatusViewer {
    pub fn new(items: Vec<StatusItem>) -> Self {
        let open = !items.is_empty();
        Self {
            items,
            index: 0,
            progress: 0,
            open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current(&self) -> Option<&StatusItem> {
        self.open.then(|| self.items.get(self.index)).flatten()
    }

    pub fn tick(&mut self) {
        if !self.open {
            return;
        }
        self.progress = (self.progress + 1).min(FULL_PROGRESS);
        if self.progress >= FULL_PROGRESS {
            self.next();
        }
    }

    pub fn next(&mut self) {
        if !self.open {
            return;
        }
        if self.index + 1 < self.items.len() {
            self.index += 1;
            self.progress = 0;
        } else {
            self.close();
        }
    }

    pub fn prev(&mut self) {
        if !self.open || self.index == 0 {
            return;
        }
        self.index -= 1;
        self.progress = 0;
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}
