//! Multi-dimensional resource vector
//!
//! `ResourceVector` models capacity or usage across CPU, memory, pod count and
//! any number of named scalar extensions. CPU and scalars are in milli-units.
//! Memory is also held in milli-units (milli-bytes) when built from a native
//! resource list; see [`crate::convert`].

use std::collections::BTreeMap;
use std::fmt;

/// Tolerance for comparing accumulated milli-unit values
pub const MIN_RESOURCE: f64 = 0.1;

/// Capacity or usage across all schedulable dimensions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceVector {
    /// CPU in milli-cores
    pub milli_cpu: f64,
    /// Memory; milli-bytes when converted from a resource list
    pub memory: f64,
    /// Pod-count capacity, whole units
    pub max_task_num: i64,
    /// Extension dimensions keyed by resource name, milli-units
    pub scalar_resources: BTreeMap<String, f64>,
}

impl ResourceVector {
    /// The all-zero vector
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a vector from CPU and memory only
    pub fn new(milli_cpu: f64, memory: f64) -> Self {
        Self {
            milli_cpu,
            memory,
            ..Self::default()
        }
    }

    /// Add `other` into `self`, dimension-wise
    pub fn add(&mut self, other: &ResourceVector) -> &mut Self {
        self.milli_cpu += other.milli_cpu;
        self.memory += other.memory;
        self.max_task_num += other.max_task_num;
        for (name, quantity) in &other.scalar_resources {
            self.add_scalar(name, *quantity);
        }
        self
    }

    /// Subtract `other`, flooring every dimension at zero
    pub fn sub(&mut self, other: &ResourceVector) -> &mut Self {
        self.milli_cpu = (self.milli_cpu - other.milli_cpu).max(0.0);
        self.memory = (self.memory - other.memory).max(0.0);
        self.max_task_num = (self.max_task_num - other.max_task_num).max(0);
        for (name, quantity) in &other.scalar_resources {
            let entry = self.scalar_resources.entry(name.clone()).or_default();
            *entry = (*entry - quantity).max(0.0);
        }
        self
    }

    /// Subtract `other` allowing dimensions to go negative.
    ///
    /// Used for deficit computations, where a negative dimension records how
    /// far short the left-hand side falls.
    pub fn sub_allow_negative(&mut self, other: &ResourceVector) -> &mut Self {
        self.milli_cpu -= other.milli_cpu;
        self.memory -= other.memory;
        self.max_task_num -= other.max_task_num;
        for (name, quantity) in &other.scalar_resources {
            *self.scalar_resources.entry(name.clone()).or_default() -= quantity;
        }
        self
    }

    /// Raise every dimension to at least the value in `other`
    pub fn set_max(&mut self, other: &ResourceVector) -> &mut Self {
        self.milli_cpu = self.milli_cpu.max(other.milli_cpu);
        self.memory = self.memory.max(other.memory);
        self.max_task_num = self.max_task_num.max(other.max_task_num);
        for (name, quantity) in &other.scalar_resources {
            let entry = self.scalar_resources.entry(name.clone()).or_default();
            *entry = entry.max(*quantity);
        }
        self
    }

    /// Add `quantity` to the named scalar dimension
    pub fn add_scalar(&mut self, name: &str, quantity: f64) {
        *self.scalar_resources.entry(name.to_string()).or_default() += quantity;
    }

    /// Overwrite the named scalar dimension
    pub fn set_scalar(&mut self, name: &str, quantity: f64) {
        self.scalar_resources.insert(name.to_string(), quantity);
    }

    /// Value of a scalar dimension, zero when absent
    pub fn scalar(&self, name: &str) -> f64 {
        self.scalar_resources.get(name).copied().unwrap_or(0.0)
    }

    /// True when every dimension is within `tolerance` of the other vector.
    ///
    /// Scalar keys present on only one side compare against zero.
    pub fn equal(&self, other: &ResourceVector, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;

        close(self.milli_cpu, other.milli_cpu)
            && close(self.memory, other.memory)
            && close(self.max_task_num as f64, other.max_task_num as f64)
            && self
                .scalar_names(other)
                .all(|name| close(self.scalar(name), other.scalar(name)))
    }

    /// True when no dimension exceeds `other` by more than `tolerance`
    pub fn less_equal(&self, other: &ResourceVector, tolerance: f64) -> bool {
        let le = |a: f64, b: f64| a <= b + tolerance;

        le(self.milli_cpu, other.milli_cpu)
            && le(self.memory, other.memory)
            && le(self.max_task_num as f64, other.max_task_num as f64)
            && self
                .scalar_names(other)
                .all(|name| le(self.scalar(name), other.scalar(name)))
    }

    /// True when every dimension is below [`MIN_RESOURCE`]
    pub fn is_empty(&self) -> bool {
        self.milli_cpu < MIN_RESOURCE
            && self.memory < MIN_RESOURCE
            && self.max_task_num == 0
            && self.scalar_resources.values().all(|q| *q < MIN_RESOURCE)
    }

    fn scalar_names<'a>(&'a self, other: &'a ResourceVector) -> impl Iterator<Item = &'a str> {
        self.scalar_resources
            .keys()
            .chain(
                other
                    .scalar_resources
                    .keys()
                    .filter(|k| !self.scalar_resources.contains_key(*k)),
            )
            .map(String::as_str)
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu {:.2}, memory {:.2}, pods {}",
            self.milli_cpu, self.memory, self.max_task_num
        )?;
        for (name, quantity) in &self.scalar_resources {
            write!(f, ", {} {:.2}", name, quantity)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(milli_cpu: f64, memory: f64, gpus: f64) -> ResourceVector {
        let mut r = ResourceVector::new(milli_cpu, memory);
        r.set_scalar("nvidia.com/gpu", gpus);
        r
    }

    #[test]
    fn add_merges_scalar_keys() {
        let mut a = gpu(1000.0, 2000.0, 1000.0);
        let mut b = ResourceVector::new(500.0, 0.0);
        b.set_scalar("example.com/fpga", 2000.0);

        a.add(&b);

        assert_eq!(a.milli_cpu, 1500.0);
        assert_eq!(a.scalar("nvidia.com/gpu"), 1000.0);
        assert_eq!(a.scalar("example.com/fpga"), 2000.0);
    }

    #[test]
    fn sub_floors_at_zero() {
        let mut a = gpu(1000.0, 100.0, 0.0);
        a.sub(&gpu(1500.0, 50.0, 1000.0));

        assert_eq!(a.milli_cpu, 0.0);
        assert_eq!(a.memory, 50.0);
        assert_eq!(a.scalar("nvidia.com/gpu"), 0.0);
    }

    #[test]
    fn sub_allow_negative_records_deficit() {
        let mut a = ResourceVector::new(1000.0, 0.0);
        a.sub_allow_negative(&gpu(1500.0, 10.0, 1000.0));

        assert_eq!(a.milli_cpu, -500.0);
        assert_eq!(a.memory, -10.0);
        assert_eq!(a.scalar("nvidia.com/gpu"), -1000.0);
    }

    #[test]
    fn set_max_is_dimension_wise() {
        let mut a = gpu(1000.0, 50.0, 0.0);
        a.set_max(&gpu(500.0, 100.0, 2000.0));

        assert_eq!(a.milli_cpu, 1000.0);
        assert_eq!(a.memory, 100.0);
        assert_eq!(a.scalar("nvidia.com/gpu"), 2000.0);
    }

    #[test]
    fn equal_is_reflexive_and_symmetric() {
        let a = gpu(1000.0, 2048.0, 1000.0);
        let b = gpu(1000.05, 2048.0, 1000.0);

        assert!(a.equal(&a, MIN_RESOURCE));
        assert!(a.equal(&b, MIN_RESOURCE));
        assert!(b.equal(&a, MIN_RESOURCE));
    }

    #[test]
    fn equal_rejects_drift_above_tolerance() {
        let a = ResourceVector::new(1000.0, 0.0);
        let b = ResourceVector::new(1000.2, 0.0);
        assert!(!a.equal(&b, MIN_RESOURCE));
        assert!(a.equal(&b, 0.5));
    }

    #[test]
    fn equal_treats_missing_scalars_as_zero() {
        let a = ResourceVector::new(1.0, 1.0);
        let mut b = a.clone();
        b.set_scalar("hugepages-2Mi", 0.0);
        assert!(a.equal(&b, MIN_RESOURCE));
        assert!(b.equal(&a, MIN_RESOURCE));

        b.set_scalar("hugepages-2Mi", 5.0);
        assert!(!a.equal(&b, MIN_RESOURCE));
        assert!(!b.equal(&a, MIN_RESOURCE));
    }

    #[test]
    fn less_equal_with_tolerance() {
        let small = gpu(1000.0, 100.0, 0.0);
        let large = gpu(2000.0, 100.05, 1000.0);
        assert!(small.less_equal(&large, MIN_RESOURCE));
        assert!(!large.less_equal(&small, MIN_RESOURCE));
    }

    #[test]
    fn empty_vector_is_empty() {
        assert!(ResourceVector::empty().is_empty());
        assert!(!ResourceVector::new(1.0, 0.0).is_empty());
    }

    #[test]
    fn display_lists_scalars() {
        let r = gpu(1500.0, 0.0, 1000.0);
        assert_eq!(
            r.to_string(),
            "cpu 1500.00, memory 0.00, pods 0, nvidia.com/gpu 1000.00"
        );
    }
}
