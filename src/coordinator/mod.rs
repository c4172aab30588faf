//! The coordinator: name resolution, group membership, barriers.
//!
//! One coordinator serves a whole deployment. Local threads call it directly;
//! remote processes reach the operations listed in [`Coordinator::exports`]
//! through a dispatcher (see [`crate::service`]), which also tells the
//! coordinator who is calling. A direct call acts on behalf of the
//! coordinator's own process.
//!
//! Each registry is guarded by its own spinlocked container. Updates that
//! touch several containers at once are additionally serialized by a lock
//! dedicated to that registry, so e.g. a publish never waits for a group join.

mod barrier;

pub use barrier::Barrier;

use std::{
    collections::HashSet,
    sync::{Arc, Condvar, Mutex, PoisonError},
};

use tracing::{debug, info, trace};

use crate::{
    common::{
        Config, InstanceId, LogicError, TypeId, INVALID_INSTANCE_ID, INVALID_TYPE_ID,
    },
    facade::{DiagnosticSink, IdAllocator, RandomIdAllocator, TracingSink},
    logic_error,
    rpc::{current_caller, ExportTable},
    spinlock::Spinlock,
    spinlocked::{SpinlockedMap, SpinlockedSet},
};

pub struct Coordinator {
    process_id: InstanceId,
    id_allocator: Box<dyn IdAllocator>,
    sink: Box<dyn DiagnosticSink>,

    type_of_name: SpinlockedMap<String, TypeId>,

    publish_lock: Spinlock<()>,
    instance_of_name: SpinlockedMap<String, InstanceId>,
    name_of_instance: SpinlockedMap<InstanceId, String>,
    // owner -> what it published, and the reverse index
    published: SpinlockedMap<InstanceId, SpinlockedSet<InstanceId>>,
    publisher_of: SpinlockedMap<InstanceId, InstanceId>,

    membership_lock: Spinlock<()>,
    processes_of_group: SpinlockedMap<TypeId, SpinlockedSet<InstanceId>>,
    groups_of_process: SpinlockedMap<InstanceId, SpinlockedSet<TypeId>>,

    barrier_table: SpinlockedMap<TypeId, Arc<Barrier>>,

    done_processes: Mutex<HashSet<InstanceId>>,
    all_other_processes_done: Condvar,
}

impl Coordinator {
    pub fn new(
        process_id: Option<InstanceId>,
        id_allocator: impl IdAllocator + 'static,
        sink: impl DiagnosticSink + 'static,
    ) -> Self {
        let process_id = process_id.unwrap_or_else(|| id_allocator.allocate());
        info!(process_id, "coordinator started");
        Self {
            process_id,
            id_allocator: Box::new(id_allocator),
            sink: Box::new(sink),
            type_of_name: Default::default(),
            publish_lock: Default::default(),
            instance_of_name: Default::default(),
            name_of_instance: Default::default(),
            published: Default::default(),
            publisher_of: Default::default(),
            membership_lock: Default::default(),
            processes_of_group: Default::default(),
            groups_of_process: Default::default(),
            barrier_table: Default::default(),
            done_processes: Default::default(),
            all_other_processes_done: Default::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let coordinator = Self::new(config.process_id, RandomIdAllocator, TracingSink);
        for name in &config.group {
            let group_id = coordinator.register_type(name.clone());
            debug!(group_id, "registered group {}", name);
        }
        coordinator
    }

    /// Operations reachable by remote processes.
    pub fn exports() -> ExportTable<Self> {
        crate::export_rpc!(Coordinator {
            resolve_type,
            resolve_instance,
            register_type,
            publish_transceiver,
            unpublish_transceiver,
            add_this_process_into_group,
            barrier,
            print,
        })
    }

    pub fn process_id(&self) -> InstanceId {
        self.process_id
    }

    fn caller(&self) -> InstanceId {
        current_caller().unwrap_or(self.process_id)
    }
}

// types and names
impl Coordinator {
    pub fn resolve_type(&self, name: String) -> TypeId {
        self.type_of_name.get(&name).unwrap_or(INVALID_TYPE_ID)
    }

    /// Type id of `name`, allocating one the first time the name is seen.
    pub fn register_type(&self, name: String) -> TypeId {
        if name.is_empty() {
            return INVALID_TYPE_ID;
        }
        self.type_of_name.with_mut(|type_of_name| {
            *type_of_name
                .entry(name)
                .or_insert_with(|| self.id_allocator.allocate())
        })
    }

    pub fn resolve_instance(&self, name: String) -> InstanceId {
        self.instance_of_name
            .get(&name)
            .unwrap_or(INVALID_INSTANCE_ID)
    }

    pub fn name_of_instance(&self, instance_id: InstanceId) -> Option<String> {
        self.name_of_instance.get(&instance_id)
    }

    /// Bind `name` to `instance_id`, owned by the caller.
    ///
    /// Fails if the name is bound to another instance or the instance already
    /// has another name. Publishing the exact same binding again succeeds and
    /// keeps the original owner.
    pub fn publish_transceiver(&self, instance_id: InstanceId, name: String) -> bool {
        if instance_id == INVALID_INSTANCE_ID || name.is_empty() {
            return false;
        }
        let owner = self.caller();
        let _publish = self.publish_lock.lock();
        match self.instance_of_name.get(&name) {
            Some(published_id) if published_id == instance_id => return true,
            Some(published_id) => {
                debug!(instance_id, published_id, "name {:?} is taken", name);
                return false;
            }
            None => {}
        }
        if self.name_of_instance.contains_key(&instance_id) {
            debug!(instance_id, "instance already published under another name");
            return false;
        }

        self.instance_of_name.insert(name.clone(), instance_id);
        self.published
            .with_entry_or_default(owner, |instance_set| instance_set.insert(instance_id));
        self.publisher_of.insert(instance_id, owner);
        debug!(instance_id, owner, "published {:?}", name);
        self.name_of_instance.insert(instance_id, name);
        true
    }

    /// Retract a publication. Only its owner, or this coordinator's own
    /// process on the owner's behalf, may do so.
    pub fn unpublish_transceiver(&self, instance_id: InstanceId) -> bool {
        let caller = self.caller();
        let _publish = self.publish_lock.lock();
        let owner = match self.publisher_of.get(&instance_id) {
            Some(owner) => owner,
            None => return false,
        };
        if caller != owner && caller != self.process_id {
            debug!(instance_id, owner, caller, "unpublish by non-owner");
            return false;
        }

        self.publisher_of.remove(&instance_id);
        self.retract_name(instance_id);
        self.published.with_mut(|published| {
            let drained = published.get(&owner).map_or(false, |instance_set| {
                instance_set.remove(&instance_id);
                instance_set.is_empty()
            });
            if drained {
                published.remove(&owner);
            }
        });
        true
    }

    /// Retract everything `owner` has published, e.g. after the owner went
    /// away. Returns the number of retracted publications.
    pub fn revoke_publications(&self, owner: InstanceId) -> usize {
        let _publish = self.publish_lock.lock();
        let instance_set = match self.published.remove(&owner) {
            Some(instance_set) => instance_set.into_inner(),
            None => return 0,
        };
        for instance_id in &instance_set {
            self.publisher_of.remove(instance_id);
            self.retract_name(*instance_id);
        }
        debug!(owner, count = instance_set.len(), "revoked publications");
        instance_set.len()
    }

    pub fn publications_of(&self, owner: InstanceId) -> HashSet<InstanceId> {
        self.published.with(|published| {
            published
                .get(&owner)
                .map(|instance_set| instance_set.snapshot())
                .unwrap_or_default()
        })
    }

    // publish lock held
    fn retract_name(&self, instance_id: InstanceId) {
        if let Some(name) = self.name_of_instance.remove(&instance_id) {
            self.instance_of_name.remove(&name);
            debug!(instance_id, "unpublished {:?}", name);
        }
    }

    /// Verify the name registry is a bijection and agrees with the
    /// publication records.
    pub fn check_publications(&self) -> Result<(), LogicError> {
        let _publish = self.publish_lock.lock();
        let instance_of_name = self.instance_of_name.snapshot();
        let name_of_instance = self.name_of_instance.snapshot();
        if instance_of_name.len() != name_of_instance.len() {
            return Err(logic_error!(
                "{} names for {} instances",
                instance_of_name.len(),
                name_of_instance.len()
            ));
        }
        for (name, instance_id) in &instance_of_name {
            if name_of_instance.get(instance_id) != Some(name) {
                return Err(logic_error!("name {:?} is not mirrored", name));
            }
            let owner = self
                .publisher_of
                .get(instance_id)
                .ok_or_else(|| logic_error!("instance {} has no owner", instance_id))?;
            if !self.publications_of(owner).contains(instance_id) {
                return Err(logic_error!(
                    "instance {} missing from records of {}",
                    instance_id,
                    owner
                ));
            }
        }
        Ok(())
    }
}

// groups
impl Coordinator {
    /// Idempotent: joining a group twice leaves a single membership.
    pub fn add_process_into_group(&self, process_id: InstanceId, group_id: TypeId) -> bool {
        if process_id == INVALID_INSTANCE_ID || group_id == INVALID_TYPE_ID {
            return false;
        }
        let _membership = self.membership_lock.lock();
        let joined = self
            .processes_of_group
            .with_entry_or_default(group_id, |process_set| process_set.insert(process_id));
        self.groups_of_process
            .with_entry_or_default(process_id, |group_set| group_set.insert(group_id));
        if joined {
            debug!(process_id, group_id, "joined group");
        }
        true
    }

    pub fn add_this_process_into_group(&self, group_id: TypeId) -> bool {
        self.add_process_into_group(self.caller(), group_id)
    }

    pub fn group_members(&self, group_id: TypeId) -> HashSet<InstanceId> {
        self.processes_of_group.with(|processes_of_group| {
            processes_of_group
                .get(&group_id)
                .map(|process_set| process_set.snapshot())
                .unwrap_or_default()
        })
    }

    pub fn groups_of_process(&self, process_id: InstanceId) -> HashSet<TypeId> {
        self.groups_of_process.with(|groups_of_process| {
            groups_of_process
                .get(&process_id)
                .map(|group_set| group_set.snapshot())
                .unwrap_or_default()
        })
    }

    pub fn group_size(&self, group_id: TypeId) -> usize {
        self.processes_of_group.with(|processes_of_group| {
            processes_of_group
                .get(&group_id)
                .map_or(0, |process_set| process_set.len())
        })
    }

    pub fn is_member(&self, process_id: InstanceId, group_id: TypeId) -> bool {
        self.processes_of_group.with(|processes_of_group| {
            processes_of_group
                .get(&group_id)
                .map_or(false, |process_set| process_set.contains(&process_id))
        })
    }

    /// Verify group -> processes and process -> groups are exact duals.
    pub fn check_membership(&self) -> Result<(), LogicError> {
        let _membership = self.membership_lock.lock();
        let processes_of_group = self.processes_of_group.snapshot();
        let groups_of_process = self.groups_of_process.snapshot();
        let mut forward = 0;
        for (group_id, process_set) in &processes_of_group {
            for process_id in process_set.snapshot() {
                forward += 1;
                let mirrored = groups_of_process
                    .get(&process_id)
                    .map_or(false, |group_set| group_set.contains(group_id));
                if !mirrored {
                    return Err(logic_error!(
                        "process {} in group {} is not mirrored",
                        process_id,
                        group_id
                    ));
                }
            }
        }
        let backward: usize = groups_of_process
            .values()
            .map(|group_set| group_set.len())
            .sum();
        if forward != backward {
            return Err(logic_error!(
                "{} group memberships but {} process memberships",
                forward,
                backward
            ));
        }
        Ok(())
    }
}

// synchronization
impl Coordinator {
    /// Block until every member of `group_id` has called `barrier` in the
    /// current round.
    ///
    /// A caller outside the group gets `Ok(false)` without blocking. A group
    /// without any member can never be satisfied, so waiting on one is a
    /// logic error.
    pub fn barrier(&self, group_id: TypeId) -> Result<bool, LogicError> {
        let caller = self.caller();
        if self.group_size(group_id) == 0 {
            return Err(logic_error!(
                "barrier on group {} which has no member",
                group_id
            ));
        }
        if !self.is_member(caller, group_id) {
            debug!(caller, group_id, "barrier by non-member");
            return Ok(false);
        }
        let barrier = self.barrier_table.get_or_default(group_id);
        let generation = barrier.arrive(|| self.group_size(group_id));
        trace!(caller, group_id, generation, "passed barrier");
        Ok(true)
    }

    /// Arrivals counted in the current round of `group_id`.
    pub fn barrier_reached(&self, group_id: TypeId) -> usize {
        self.barrier_table
            .get(&group_id)
            .map_or(0, |barrier| barrier.reached())
    }

    /// Number of rounds of `group_id` released so far.
    pub fn barrier_generation(&self, group_id: TypeId) -> u64 {
        self.barrier_table
            .get(&group_id)
            .map_or(0, |barrier| barrier.generation())
    }

    /// Lifecycle signal: `process_id` will not issue further requests.
    pub fn mark_process_done(&self, process_id: InstanceId) {
        let mut done_processes = self
            .done_processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        done_processes.insert(process_id);
        self.all_other_processes_done.notify_all();
        debug!(process_id, "process done");
    }

    /// Block until every process known to the membership registry, other
    /// than this coordinator's own, has been marked done.
    pub fn wait_until_all_other_processes_are_done(&self) {
        let done_processes = self
            .done_processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _done_processes = self
            .all_other_processes_done
            .wait_while(done_processes, |done_processes| {
                !self.other_processes().is_subset(done_processes)
            })
            .unwrap_or_else(PoisonError::into_inner);
        info!("all other processes are done");
    }

    fn other_processes(&self) -> HashSet<InstanceId> {
        let mut process_set: HashSet<_> = self.groups_of_process.keys().into_iter().collect();
        process_set.remove(&self.process_id);
        process_set
    }

    pub fn print(&self, text: String) {
        self.sink.print(self.caller(), &text);
    }
}
