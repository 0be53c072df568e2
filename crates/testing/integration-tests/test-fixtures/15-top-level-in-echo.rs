macro_rules! wrap {
    ($sep:tt $($x:ident)*) => {
     //X
        $($x $sep)*
            //^
    };
}
