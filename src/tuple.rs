//! Calling functions with arguments collected into a tuple.
//!
//! A remote invocation arrives as one value, the tuple of its decoded
//! arguments, while the operation it targets is an ordinary function with a
//! fixed parameter list. [`CallWithTuple`] and [`CallMethodWithTuple`] bridge
//! the two: for every arity up to 8 they are implemented for any matching
//! `Fn`, unpacking the tuple positionally and returning whatever the function
//! returns.
//!
//! Arguments are moved out of the owned tuple. An operation meant to be
//! invoked this way takes its parameters by value; in particular it cannot
//! take `&mut` parameters, which have nothing to borrow from once the tuple is
//! consumed.
//!
//! ```
//! use syndic::tuple::{call_function_with_tuple, call_method_with_tuple};
//!
//! fn scale(x: f64, factor: f64) -> f64 {
//!     x * factor
//! }
//! assert_eq!(call_function_with_tuple(&scale, (1.5, 2.0)), 3.0);
//!
//! struct Offset(i64);
//! impl Offset {
//!     fn apply(&self, x: i64) -> i64 {
//!         x + self.0
//!     }
//! }
//! assert_eq!(call_method_with_tuple(&Offset(10), &Offset::apply, (5,)), 15);
//! ```

use std::{any::Any, fmt::Debug};

pub trait Tuple {
    const ARITY: usize;
}

pub trait CallWithTuple<Args> {
    type Output;
    fn call_with_tuple(&self, args: Args) -> Self::Output;
}

/// Method form: the callable takes the target as its first parameter, e.g.
/// `Coordinator::barrier` for a `fn barrier(&self, ...)`.
pub trait CallMethodWithTuple<T: ?Sized, Args> {
    type Output;
    fn call_method_with_tuple(&self, target: &T, args: Args) -> Self::Output;
}

pub trait Visit {
    fn visit<V: Any + Debug>(&mut self, index: usize, value: &V);
}

pub trait VisitMut {
    fn visit_mut<V: Any + Debug>(&mut self, index: usize, value: &mut V);
}

/// Visits every slot in declaration order. There is no early exit.
pub trait ForEachInTuple {
    fn for_each_in_tuple(&self, visitor: &mut impl Visit);
    fn for_each_in_tuple_mut(&mut self, visitor: &mut impl VisitMut);
}

pub fn call_function_with_tuple<F, Args>(function: &F, args: Args) -> F::Output
where
    F: CallWithTuple<Args>,
{
    function.call_with_tuple(args)
}

pub fn call_method_with_tuple<T, F, Args>(target: &T, method: &F, args: Args) -> F::Output
where
    T: ?Sized,
    F: CallMethodWithTuple<T, Args>,
{
    method.call_method_with_tuple(target, args)
}

pub fn for_each_in_tuple(tuple: &impl ForEachInTuple, visitor: &mut impl Visit) {
    tuple.for_each_in_tuple(visitor)
}

macro_rules! count {
    () => {
        0
    };
    ($head:ident $($tail:ident)*) => {
        1 + count!($($tail)*)
    };
}

macro_rules! tuple_impl {
    ($($A:ident $a:ident),*) => {
        impl<$($A),*> Tuple for ($($A,)*) {
            const ARITY: usize = count!($($A)*);
        }

        impl<F, R, $($A),*> CallWithTuple<($($A,)*)> for F
        where
            F: Fn($($A),*) -> R,
        {
            type Output = R;
            fn call_with_tuple(&self, ($($a,)*): ($($A,)*)) -> R {
                self($($a),*)
            }
        }

        impl<F, T: ?Sized, R, $($A),*> CallMethodWithTuple<T, ($($A,)*)> for F
        where
            F: Fn(&T, $($A),*) -> R,
        {
            type Output = R;
            fn call_method_with_tuple(&self, target: &T, ($($a,)*): ($($A,)*)) -> R {
                self(target, $($a),*)
            }
        }

        impl<$($A: Any + Debug),*> ForEachInTuple for ($($A,)*) {
            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn for_each_in_tuple(&self, visitor: &mut impl Visit) {
                let ($($a,)*) = self;
                let mut index = 0;
                $(
                    visitor.visit(index, $a);
                    index += 1;
                )*
            }

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn for_each_in_tuple_mut(&mut self, visitor: &mut impl VisitMut) {
                let ($($a,)*) = self;
                let mut index = 0;
                $(
                    visitor.visit_mut(index, $a);
                    index += 1;
                )*
            }
        }
    };
}

// peel one element per step, down to the empty tuple
macro_rules! tuple_impls {
    () => {
        tuple_impl!();
    };
    ($A:ident $a:ident $(, $tail_A:ident $tail_a:ident)*) => {
        tuple_impl!($A $a $(, $tail_A $tail_a)*);
        tuple_impls!($($tail_A $tail_a),*);
    };
}

tuple_impls!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn zero() -> &'static str {
        "zero"
    }
    fn one(a: i32) -> i32 {
        a * 2
    }
    fn two(a: i32, b: f32) -> f32 {
        a as f32 + b
    }
    fn three(a: String, b: u8, c: char) -> String {
        format!("{}{}{}", a, b, c)
    }
    fn four(a: u64, b: u64, c: u64, d: u64) -> u64 {
        a * 1000 + b * 100 + c * 10 + d
    }
    fn five(a: bool, b: i8, c: i16, d: i32, e: i64) -> (bool, i64) {
        (!a, b as i64 + c as i64 + d as i64 + e)
    }

    #[test]
    fn free_function_matches_direct_call() {
        assert_eq!(call_function_with_tuple(&zero, ()), zero());
        assert_eq!(call_function_with_tuple(&one, (21,)), one(21));
        assert_eq!(call_function_with_tuple(&two, (1, 0.5)), two(1, 0.5));
        assert_eq!(
            call_function_with_tuple(&three, ("x".to_string(), 7, 'z')),
            three("x".to_string(), 7, 'z')
        );
        assert_eq!(call_function_with_tuple(&four, (1, 2, 3, 4)), 1234);
        assert_eq!(
            call_function_with_tuple(&five, (false, 1, 2, 3, 4)),
            five(false, 1, 2, 3, 4)
        );
    }

    #[test]
    fn closure_with_unit_return() {
        let called = Cell::new(0);
        call_function_with_tuple(&|a: i32, b: i32| called.set(a + b), (3, 4));
        assert_eq!(called.get(), 7);
    }

    struct Account {
        balance: i64,
        log: Cell<usize>,
    }

    impl Account {
        fn zero(&self) -> i64 {
            self.log.set(self.log.get() + 1);
            self.balance
        }
        fn one(&self, a: i64) -> i64 {
            self.balance + a
        }
        fn two(&self, a: i64, b: i64) -> i64 {
            self.balance + a - b
        }
        fn three(&self, a: i64, b: i64, c: String) -> String {
            format!("{}:{}", c, self.balance + a + b)
        }
        fn four(&self, a: i64, b: i64, c: i64, d: i64) -> Vec<i64> {
            vec![self.balance, a, b, c, d]
        }
        fn five(&self, a: i64, b: i64, c: i64, d: i64, e: i64) -> i64 {
            self.balance + a + b + c + d + e
        }
    }

    #[test]
    fn method_matches_direct_call() {
        let account = Account {
            balance: 100,
            log: Cell::new(0),
        };
        assert_eq!(call_method_with_tuple(&account, &Account::zero, ()), 100);
        assert_eq!(account.log.get(), 1);
        assert_eq!(
            call_method_with_tuple(&account, &Account::one, (5,)),
            account.one(5)
        );
        assert_eq!(
            call_method_with_tuple(&account, &Account::two, (5, 7)),
            account.two(5, 7)
        );
        assert_eq!(
            call_method_with_tuple(&account, &Account::three, (1, 2, "sum".to_string())),
            "sum:103"
        );
        assert_eq!(
            call_method_with_tuple(&account, &Account::four, (1, 2, 3, 4)),
            account.four(1, 2, 3, 4)
        );
        assert_eq!(
            call_method_with_tuple(&account, &Account::five, (1, 2, 3, 4, 5)),
            115
        );
    }

    #[test]
    fn arity() {
        assert_eq!(<() as Tuple>::ARITY, 0);
        assert_eq!(<(u8,) as Tuple>::ARITY, 1);
        assert_eq!(<(u8, u8, u8, u8, u8) as Tuple>::ARITY, 5);
        assert_eq!(<(u8, u8, u8, u8, u8, u8, u8, u8) as Tuple>::ARITY, 8);
    }

    #[derive(Default)]
    struct Render(Vec<(usize, String)>);
    impl Visit for Render {
        fn visit<V: Any + Debug>(&mut self, index: usize, value: &V) {
            self.0.push((index, format!("{:?}", value)));
        }
    }

    struct Double;
    impl VisitMut for Double {
        fn visit_mut<V: Any + Debug>(&mut self, _index: usize, value: &mut V) {
            if let Some(value) = (value as &mut dyn Any).downcast_mut::<i32>() {
                *value *= 2;
            }
        }
    }

    #[test]
    fn for_each_visits_in_order() {
        let mut render = Render::default();
        for_each_in_tuple(&(1u8, "two", 3.5f64), &mut render);
        assert_eq!(
            render.0,
            vec![
                (0, "1".to_string()),
                (1, "\"two\"".to_string()),
                (2, "3.5".to_string())
            ]
        );

        let mut render = Render::default();
        ().for_each_in_tuple(&mut render);
        assert!(render.0.is_empty());
    }

    #[test]
    fn for_each_mut_touches_every_slot() {
        let mut tuple = (1i32, "skip", 2i32, 3i32);
        tuple.for_each_in_tuple_mut(&mut Double);
        assert_eq!(tuple, (2, "skip", 4, 6));
    }
}
