#![forbid(unsafe_code)]

//! Derived values that recompute when their sources change.
//!
//! A [`Computed<T>`] owns an output [`Observable<T>`] plus the subscriptions
//! that keep it fresh. Because the output is an ordinary observable, a
//! recomputation that yields an equal value does not notify downstream
//! subscribers.

use std::rc::Rc;

use super::observable::{Observable, Subscription};

/// A read-only value derived from one or more observables.
pub struct Computed<T> {
    output: Observable<T>,
    _sources: Rc<Vec<Subscription>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            _sources: Rc::clone(&self._sources),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("output", &self.output)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Derive from a single source.
    pub fn from_observable<A>(source: &Observable<A>, f: impl Fn(&A) -> T + 'static) -> Self
    where
        A: Clone + PartialEq + 'static,
    {
        let f = Rc::new(f);
        let output = Observable::new(source.with(|a| f(a)));
        let out = output.clone();
        let sub = source.subscribe(move |a| {
            out.set(f(a));
        });
        Self {
            output,
            _sources: Rc::new(vec![sub]),
        }
    }

    /// Derive from two sources; recomputes when either changes.
    pub fn from2<A, B>(
        a: &Observable<A>,
        b: &Observable<B>,
        f: impl Fn(&A, &B) -> T + 'static,
    ) -> Self
    where
        A: Clone + PartialEq + 'static,
        B: Clone + PartialEq + 'static,
    {
        let f = Rc::new(f);
        let output = Observable::new(a.with(|av| b.with(|bv| f(av, bv))));

        let (out, f1, b1) = (output.clone(), Rc::clone(&f), b.clone());
        let sub_a = a.subscribe(move |av| {
            out.set(b1.with(|bv| f1(av, bv)));
        });
        let (out, f2, a2) = (output.clone(), Rc::clone(&f), a.clone());
        let sub_b = b.subscribe(move |bv| {
            out.set(a2.with(|av| f2(av, bv)));
        });

        Self {
            output,
            _sources: Rc::new(vec![sub_a, sub_b]),
        }
    }

    /// Current derived value.
    #[must_use]
    pub fn get(&self) -> T {
        self.output.get()
    }

    /// Subscribe to changes of the derived value.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.output.subscribe(callback)
    }

    /// The underlying output cell (read side only by convention).
    #[must_use]
    pub fn observable(&self) -> &Observable<T> {
        &self.output
    }
}
